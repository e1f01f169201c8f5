//! # Dataset Records
//!
//! The transaction dataset is a CSV export of Ethereum transfers. Only
//! four columns matter:
//!
//! | Column | Meaning |
//! |--------|---------|
//! | 3 | sender, `0x`-prefixed |
//! | 4 | recipient, `0x`-prefixed |
//! | 6, 7 | contract-creation / contract-call flags, must both be `"0"` |
//! | 8 | value in wei, decimal |
//!
//! Rows that are not plain account-to-account transfers are skipped.

use crate::domain::errors::{SupervisorError, SupervisorResult};
use num_bigint::BigUint;
use shared_types::{now_millis, Transaction};

const SENDER: usize = 3;
const RECIPIENT: usize = 4;
const CREATE_FLAG: usize = 6;
const CALL_FLAG: usize = 7;
const VALUE: usize = 8;

/// Shortest address column accepted, prefix included.
const MIN_ADDR_LEN: usize = 17;

/// Parse one CSV line into a transfer.
///
/// `Ok(None)` for rows that are skipped (header, contract rows, self
/// transfers, short rows). An unparsable value on an otherwise valid row is
/// an error.
pub fn parse_record(line: &str, line_no: usize, nonce: u64) -> SupervisorResult<Option<Transaction>> {
    let fields: Vec<&str> = line.trim_end().split(',').collect();
    if fields.len() <= VALUE {
        return Ok(None);
    }
    let (sender, recipient) = (fields[SENDER], fields[RECIPIENT]);
    let plain_transfer = fields[CREATE_FLAG] == "0"
        && fields[CALL_FLAG] == "0"
        && sender.len() >= MIN_ADDR_LEN
        && recipient.len() >= MIN_ADDR_LEN
        && sender != recipient;
    if !plain_transfer {
        return Ok(None);
    }

    let value = fields[VALUE]
        .parse::<BigUint>()
        .map_err(|e| SupervisorError::Dataset {
            line: line_no,
            reason: format!("value {:?}: {e}", fields[VALUE]),
        })?;
    let mut tx = Transaction::new(strip_hex(sender), strip_hex(recipient), value, nonce);
    tx.time = now_millis();
    Ok(Some(tx))
}

fn strip_hex(addr: &str) -> String {
    addr.strip_prefix("0x").unwrap_or(addr).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0x1111111111111111111111111111111111111111";
    const BOB: &str = "0x2222222222222222222222222222222222222222";

    fn row(sender: &str, recipient: &str, create: &str, call: &str, value: &str) -> String {
        format!("1,0xblock,7,{sender},{recipient},21000,{create},{call},{value},x")
    }

    #[test]
    fn test_plain_transfer_is_parsed() {
        let tx = parse_record(&row(ALICE, BOB, "0", "0", "1000"), 1, 5)
            .unwrap()
            .unwrap();
        assert_eq!(tx.sender, "1111111111111111111111111111111111111111");
        assert_eq!(tx.recipient, "2222222222222222222222222222222222222222");
        assert_eq!(tx.value, BigUint::from(1000u32));
        assert_eq!(tx.nonce, 5);
    }

    #[test]
    fn test_non_transfer_rows_are_skipped() {
        let header = "blockNumber,timestamp,hash,from,to,gas,isCreation,isCall,value";
        assert!(parse_record(header, 0, 0).unwrap().is_none());
        assert!(parse_record(&row(ALICE, BOB, "1", "0", "1"), 1, 0).unwrap().is_none());
        assert!(parse_record(&row(ALICE, BOB, "0", "1", "1"), 1, 0).unwrap().is_none());
        assert!(parse_record(&row(ALICE, ALICE, "0", "0", "1"), 1, 0).unwrap().is_none());
        assert!(parse_record(&row("0x12", BOB, "0", "0", "1"), 1, 0).unwrap().is_none());
        assert!(parse_record("a,b,c", 1, 0).unwrap().is_none());
    }

    #[test]
    fn test_bad_value_is_an_error() {
        let err = parse_record(&row(ALICE, BOB, "0", "0", "1e18"), 9, 0).unwrap_err();
        assert!(matches!(err, SupervisorError::Dataset { line: 9, .. }));
    }
}
