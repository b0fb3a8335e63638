//! Legacy transaction format: message compilation, signing, wire encoding

use super::keys::{Keypair, Pubkey, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::payments::PaymentError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// System program transfer of `lamports` from `from` to `to`
pub fn system_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction {
        program_id: *SYSTEM_PROGRAM_ID,
        accounts: vec![AccountMeta::writable(*from, true), AccountMeta::writable(*to, false)],
        data,
    }
}

/// SPL token TransferChecked between two token accounts
pub fn transfer_checked(
    source: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    owner: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Instruction {
    let mut data = Vec::with_capacity(10);
    data.push(12);
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);
    Instruction {
        program_id: *TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*source, false),
            AccountMeta::readonly(*mint, false),
            AccountMeta::writable(*destination, false),
            AccountMeta::readonly(*owner, true),
        ],
        data,
    }
}

/// Compact-u16 length prefix
pub fn encode_shortvec(out: &mut Vec<u8>, mut len: usize) {
    loop {
        let mut byte = (len & 0x7f) as u8;
        len >>= 7;
        if len == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Order accounts, fee payer first, then writable signers, readonly
    /// signers, writable non-signers and readonly non-signers
    pub fn compile(
        instructions: &[Instruction],
        fee_payer: &Pubkey,
        recent_blockhash: [u8; 32],
    ) -> Result<Self, PaymentError> {
        let mut metas: Vec<AccountMeta> = vec![AccountMeta::writable(*fee_payer, true)];
        let mut merge = |meta: AccountMeta| {
            if let Some(existing) = metas.iter_mut().find(|m| m.pubkey == meta.pubkey) {
                existing.is_signer |= meta.is_signer;
                existing.is_writable |= meta.is_writable;
            } else {
                metas.push(meta);
            }
        };
        for ix in instructions {
            for account in &ix.accounts {
                merge(account.clone());
            }
            merge(AccountMeta::readonly(ix.program_id, false));
        }

        let (payer, rest) = metas.split_at(1);
        let bucket = move |signer: bool, writable: bool| {
            rest.iter()
                .filter(move |m| m.is_signer == signer && m.is_writable == writable)
                .cloned()
        };
        let ordered: Vec<AccountMeta> = payer
            .iter()
            .cloned()
            .chain(bucket(true, true))
            .chain(bucket(true, false))
            .chain(bucket(false, true))
            .chain(bucket(false, false))
            .collect();

        if ordered.len() > u8::MAX as usize {
            return Err(PaymentError::Encoding("too many accounts".to_string()));
        }

        let count = |f: &dyn Fn(&AccountMeta) -> bool| ordered.iter().filter(|m| f(m)).count() as u8;
        let header = MessageHeader {
            num_required_signatures: count(&|m| m.is_signer),
            num_readonly_signed_accounts: count(&|m| m.is_signer && !m.is_writable),
            num_readonly_unsigned_accounts: count(&|m| !m.is_signer && !m.is_writable),
        };
        let account_keys: Vec<Pubkey> = ordered.iter().map(|m| m.pubkey).collect();
        let index_of = |key: &Pubkey| -> Result<u8, PaymentError> {
            account_keys
                .iter()
                .position(|k| k == key)
                .map(|i| i as u8)
                .ok_or_else(|| PaymentError::Encoding(format!("unknown account {key}")))
        };

        let compiled = instructions
            .iter()
            .map(|ix| {
                Ok(CompiledInstruction {
                    program_id_index: index_of(&ix.program_id)?,
                    accounts: ix
                        .accounts
                        .iter()
                        .map(|a| index_of(&a.pubkey))
                        .collect::<Result<_, _>>()?,
                    data: ix.data.clone(),
                })
            })
            .collect::<Result<Vec<_>, PaymentError>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions: compiled,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![
            self.header.num_required_signatures,
            self.header.num_readonly_signed_accounts,
            self.header.num_readonly_unsigned_accounts,
        ];
        encode_shortvec(&mut out, self.account_keys.len());
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(&self.recent_blockhash);
        encode_shortvec(&mut out, self.instructions.len());
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            encode_shortvec(&mut out, ix.accounts.len());
            out.extend_from_slice(&ix.accounts);
            encode_shortvec(&mut out, ix.data.len());
            out.extend_from_slice(&ix.data);
        }
        out
    }

    pub fn signer_keys(&self) -> &[Pubkey] {
        &self.account_keys[..self.header.num_required_signatures as usize]
    }
}

/// Message plus one signature slot per required signer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<[u8; 64]>,
    pub message: Message,
}

impl Transaction {
    pub fn new_unsigned(message: Message) -> Self {
        let slots = message.header.num_required_signatures as usize;
        Self {
            signatures: vec![[0u8; 64]; slots],
            message,
        }
    }

    /// Fill the slots of the given signers; other slots stay zeroed
    pub fn partial_sign(&mut self, signers: &[&Keypair]) -> Result<(), PaymentError> {
        let bytes = self.message.serialize();
        for signer in signers {
            let pubkey = signer.pubkey();
            let slot = self
                .message
                .signer_keys()
                .iter()
                .position(|k| *k == pubkey)
                .ok_or_else(|| PaymentError::Encoding(format!("{pubkey} is not a signer")))?;
            self.signatures[slot] = signer.sign(&bytes);
        }
        Ok(())
    }

    /// First signature, which names the transaction on chain
    pub fn signature(&self) -> Option<String> {
        self.signatures
            .first()
            .map(|sig| bs58::encode(sig).into_string())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_shortvec(&mut out, self.signatures.len());
        for sig in &self.signatures {
            out.extend_from_slice(sig);
        }
        out.extend(self.message.serialize());
        out
    }
}
