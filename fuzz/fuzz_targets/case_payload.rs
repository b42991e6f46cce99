//! Fuzz target for case payload normalization.
//!
//! The input is split at the first NUL byte into a case document and a
//! JSON array of comments. Normalization must never panic, and any record it
//! accepts must be internally consistent.
//!
//! Run with: cargo +nightly fuzz run case_payload -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let (case_json, comments_json) = match data.iter().position(|b| *b == 0) {
        Some(split) => (&data[..split], &data[split + 1..]),
        None => (data, &[][..]),
    };

    if let Ok(record) = casewatch_providers::parse_case_payload(case_json, comments_json) {
        assert!(!record.case_number.is_empty(), "accepted case without a number");
        assert!(record.priority.ordinal() <= 4, "priority out of range");
        assert!(
            record
                .comment_list
                .windows(2)
                .all(|pair| pair[0].create_time >= pair[1].create_time),
            "comments not newest first"
        );
    }
});
