//! Signature-operation counting over raw scripts.
//!
//! Counting only walks opcodes and push data; it never executes a script.

use crate::block::Transaction;
use crate::utxo::UtxoView;
use crate::{ConsensusError, ConsensusResult};

pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

/// Sigops charged for a multisig whose key count is not known.
pub const MAX_PUBKEYS_PER_MULTISIG: u32 = 20;

/// One parsed script element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Op<'a> {
    opcode: u8,
    data: &'a [u8],
}

/// Iterator over opcodes; stops at the first truncated push.
struct Ops<'a> {
    script: &'a [u8],
    pos: usize,
}

impl<'a> Ops<'a> {
    fn new(script: &'a [u8]) -> Self {
        Self { script, pos: 0 }
    }

    fn read_len(&mut self, width: usize) -> Option<usize> {
        let bytes = self.script.get(self.pos..self.pos + width)?;
        self.pos += width;
        let mut len = 0usize;
        for (i, b) in bytes.iter().enumerate() {
            len |= (*b as usize) << (8 * i);
        }
        Some(len)
    }
}

impl<'a> Iterator for Ops<'a> {
    type Item = Op<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let opcode = *self.script.get(self.pos)?;
        self.pos += 1;

        let len = match opcode {
            0x01..=0x4b => opcode as usize,
            OP_PUSHDATA1 => self.read_len(1)?,
            OP_PUSHDATA2 => self.read_len(2)?,
            OP_PUSHDATA4 => self.read_len(4)?,
            _ => 0,
        };
        let end = self.pos.checked_add(len)?;
        let data = self.script.get(self.pos..end)?;
        self.pos = end;
        Some(Op { opcode, data })
    }
}

fn decode_op_n(opcode: u8) -> Option<u32> {
    if (OP_1..=OP_16).contains(&opcode) {
        Some(u32::from(opcode - OP_1 + 1))
    } else {
        None
    }
}

/// Count sigops in a script.
///
/// In accurate mode a multisig preceded by `OP_N` counts `N`; otherwise every
/// multisig counts as `MAX_PUBKEYS_PER_MULTISIG`.
pub fn script_sigop_count(script: &[u8], accurate: bool) -> u32 {
    let mut count = 0u32;
    let mut last_opcode: Option<u8> = None;
    for op in Ops::new(script) {
        match op.opcode {
            OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                count += match last_opcode.and_then(decode_op_n) {
                    Some(n) if accurate => n,
                    _ => MAX_PUBKEYS_PER_MULTISIG,
                };
            }
            _ => {}
        }
        last_opcode = Some(op.opcode);
    }
    count
}

/// `OP_HASH160 <20 bytes> OP_EQUAL`.
pub fn is_pay_to_script_hash(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

/// Sigops in the redeem script pushed last by `script_sig`.
///
/// A scriptSig containing anything other than pushes counts zero.
pub fn p2sh_redeem_sigops(script_sig: &[u8]) -> u32 {
    let mut last_push: &[u8] = &[];
    for op in Ops::new(script_sig) {
        if op.opcode > OP_16 {
            return 0;
        }
        last_push = op.data;
    }
    script_sigop_count(last_push, true)
}

/// Legacy sigops of a transaction: every scriptSig and scriptPubKey, inaccurate mode.
pub fn legacy_sigop_count(tx: &Transaction) -> u32 {
    let inputs: u32 = tx
        .inputs
        .iter()
        .map(|input| script_sigop_count(&input.script_sig, false))
        .sum();
    let outputs: u32 = tx
        .outputs
        .iter()
        .map(|output| script_sigop_count(&output.script_pubkey, false))
        .sum();
    inputs + outputs
}

/// Sigops hidden behind P2SH outputs spent by `tx`.
pub fn p2sh_sigop_count(view: &UtxoView, tx: &Transaction) -> ConsensusResult<u32> {
    if tx.is_coinbase() {
        return Ok(0);
    }
    let txid = tx.txid();
    let mut count = 0u32;
    for (input_idx, input) in tx.inputs.iter().enumerate() {
        let coin = view
            .get(&input.prev_out)
            .ok_or(ConsensusError::MissingInput { txid, input_idx })?;
        if is_pay_to_script_hash(&coin.output.script_pubkey) {
            count += p2sh_redeem_sigops(&input.script_sig);
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p2sh_script() -> Vec<u8> {
        let mut script = vec![OP_HASH160, 0x14];
        script.extend_from_slice(&[0xab; 20]);
        script.push(OP_EQUAL);
        script
    }

    #[test]
    fn test_checksig_counting() {
        assert_eq!(script_sigop_count(&[OP_CHECKSIG], false), 1);
        assert_eq!(
            script_sigop_count(&[OP_CHECKSIG, OP_CHECKSIGVERIFY, OP_CHECKSIG], false),
            3
        );
        assert_eq!(script_sigop_count(&[], false), 0);
    }

    #[test]
    fn test_push_data_is_skipped() {
        // Push of two bytes that happen to be CHECKSIG opcodes.
        let script = [0x02, OP_CHECKSIG, OP_CHECKSIG, OP_CHECKSIG];
        assert_eq!(script_sigop_count(&script, false), 1);

        let pushdata1 = [OP_PUSHDATA1, 0x01, OP_CHECKSIG, OP_CHECKSIG];
        assert_eq!(script_sigop_count(&pushdata1, false), 1);

        let pushdata2 = [OP_PUSHDATA2, 0x01, 0x00, OP_CHECKSIG, OP_CHECKSIG];
        assert_eq!(script_sigop_count(&pushdata2, false), 1);
    }

    #[test]
    fn test_truncated_push_stops_counting() {
        let script = [OP_CHECKSIG, 0x05, OP_CHECKSIG];
        assert_eq!(script_sigop_count(&script, false), 1);
    }

    #[test]
    fn test_multisig_accurate_vs_legacy() {
        let script = [OP_1 + 2, OP_CHECKMULTISIG];
        assert_eq!(script_sigop_count(&script, false), 20);
        assert_eq!(script_sigop_count(&script, true), 3);
        // No preceding OP_N
        assert_eq!(script_sigop_count(&[OP_CHECKMULTISIGVERIFY], true), 20);
    }

    #[test]
    fn test_p2sh_detection() {
        assert!(is_pay_to_script_hash(&p2sh_script()));
        let mut bad = p2sh_script();
        bad[22] = OP_CHECKSIG;
        assert!(!is_pay_to_script_hash(&bad));
        assert!(!is_pay_to_script_hash(&[OP_HASH160]));
    }

    #[test]
    fn test_p2sh_redeem_sigops() {
        let redeem = [OP_1 + 1, OP_CHECKMULTISIG];
        let script_sig = [0x00, 0x02, redeem[0], redeem[1]];
        assert_eq!(p2sh_redeem_sigops(&script_sig), 2);

        // Non-push opcode in scriptSig
        let script_sig = [0x02, redeem[0], redeem[1], OP_CHECKSIG];
        assert_eq!(p2sh_redeem_sigops(&script_sig), 0);
    }
}
