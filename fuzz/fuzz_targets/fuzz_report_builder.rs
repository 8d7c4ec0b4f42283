//! Fuzz target: `Report::build`
//!
//! Feeds arbitrary field names and values into a small report buffer.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - A built report never exceeds its capacity and parses as JSON, with
//!   one object member per field (names are escaped, never rejected)
//! - An overflow error always reports `needed > capacity`
//!
//! cargo fuzz run fuzz_report_builder

#![no_main]

use fieldnode::error::ReportError;
use fieldnode::report::Report;
use libfuzzer_sys::fuzz_target;

const CAPACITY: usize = 128;

fuzz_target!(|data: &[u8]| {
    // Records are `len, name bytes, 4 value bytes`; a truncated tail ends the input.
    let result = Report::<CAPACITY>::build(|doc| {
        let mut rest = data;
        while let Some((&len, tail)) = rest.split_first() {
            let len = usize::from(len % 32);
            if tail.len() < len + 4 {
                break;
            }
            let (name, tail) = tail.split_at(len);
            let (value, tail) = tail.split_at(4);
            let name = String::from_utf8_lossy(name);
            let raw = u32::from_le_bytes([value[0], value[1], value[2], value[3]]);
            if raw & 1 == 0 {
                doc.set(&name, raw)?;
            } else {
                doc.set(&name, f32::from_bits(raw))?;
            }
            rest = tail;
        }
        Ok(())
    });

    match result {
        Ok(report) => {
            assert!(report.len() <= CAPACITY);
            // Non-finite floats are rendered as null, so the output is valid JSON.
            let parsed: serde_json::Value =
                serde_json::from_str(report.as_str()).expect("report is valid JSON");
            let members = parsed.as_object().expect("report is an object").len();
            assert_eq!(members, report.field_count());
        }
        Err(ReportError::Overflow { needed, capacity }) => {
            assert_eq!(capacity, CAPACITY);
            assert!(needed > capacity);
        }
        Err(ReportError::Encode | ReportError::DuplicateField) => {}
    }
});
