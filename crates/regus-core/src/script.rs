//! Script opcodes and signature-operation accounting.
//!
//! Scripts are opaque byte strings to this crate except for two concerns:
//! counting signature operations for block limits, and building pushes for
//! script construction. No script execution happens here; verification is
//! behind the [`ScriptVerifier`](crate::traits::ScriptVerifier) seam.

use crate::params::WITNESS_SCALE_FACTOR;
use crate::types::Transaction;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_NOP: u8 = 0x61;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

/// Sigops charged for a CHECKMULTISIG regardless of the actual key count.
pub const MAX_PUBKEYS_PER_MULTISIG: i64 = 20;

/// Largest direct push: lengths above this need an OP_PUSHDATA prefix.
const MAX_DIRECT_PUSH: usize = 0x4b;

/// Count signature operations in a script.
///
/// CHECKSIG and CHECKSIGVERIFY count as 1; CHECKMULTISIG and
/// CHECKMULTISIGVERIFY count as [`MAX_PUBKEYS_PER_MULTISIG`]. Push data is
/// skipped so opcode bytes inside pushed payloads are not miscounted. A
/// truncated push ends the scan with the count seen so far.
pub fn count_sigops(script: &[u8]) -> i64 {
    let mut sigops = 0i64;
    let mut i = 0usize;
    while i < script.len() {
        let opcode = script[i];
        i += 1;
        match opcode {
            1..=0x4b => {
                i += opcode as usize;
            }
            OP_PUSHDATA1 => {
                let Some(&len) = script.get(i) else { break };
                i += 1 + len as usize;
            }
            OP_PUSHDATA2 => {
                let Some(bytes) = script.get(i..i + 2) else { break };
                let len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
                i += 2 + len;
            }
            OP_PUSHDATA4 => {
                let Some(bytes) = script.get(i..i + 4) else { break };
                let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
                i += 4 + len;
            }
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                sigops += 1;
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                sigops += MAX_PUBKEYS_PER_MULTISIG;
            }
            _ => {}
        }
    }
    sigops
}

/// Signature-operation cost of a transaction: sigops in every input
/// unlocking script and every output locking script, scaled by the
/// witness factor so the cost shares units with block weight.
pub fn transaction_sigop_cost(tx: &Transaction) -> i64 {
    let mut sigops = 0i64;
    for input in &tx.inputs {
        sigops += count_sigops(&input.script_sig);
    }
    for output in &tx.outputs {
        sigops += count_sigops(&output.script_pubkey);
    }
    sigops * WITNESS_SCALE_FACTOR as i64
}

/// Append a data push to `script` using the minimal encoding.
pub fn append_push(script: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0 => script.push(OP_0),
        len if len <= MAX_DIRECT_PUSH => {
            script.push(len as u8);
            script.extend_from_slice(data);
        }
        len if len <= u8::MAX as usize => {
            script.push(OP_PUSHDATA1);
            script.push(len as u8);
            script.extend_from_slice(data);
        }
        len if len <= u16::MAX as usize => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(len as u16).to_le_bytes());
            script.extend_from_slice(data);
        }
        len => {
            script.push(OP_PUSHDATA4);
            script.extend_from_slice(&(len as u32).to_le_bytes());
            script.extend_from_slice(data);
        }
    }
}
