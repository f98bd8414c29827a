//! Transaction model and canonical encoding.
//!
//! The payload is signed by every signer that is not the payer; the envelope
//! (payload plus payload signatures) is signed by the payer. Messages are
//! prefixed with the 32-byte right-padded `FLOW-V0.0-transaction` domain tag.

use crate::{
    address::Address,
    cadence::Value,
    crypto::{HashAlgorithm, PublicKey},
    error::ValidationError,
    flow::Identifier,
};
use rlp::{Encodable, RlpStream};

/// Upper bound on the computation limit accepted by access nodes.
pub const MAX_GAS_LIMIT: u64 = 9999;

const TRANSACTION_DOMAIN_TAG: &[u8] = b"FLOW-V0.0-transaction";

fn domain_tag() -> [u8; 32] {
    let mut tag = [0u8; 32];
    tag[..TRANSACTION_DOMAIN_TAG.len()].copy_from_slice(TRANSACTION_DOMAIN_TAG);
    tag
}

/// The account key proposing the transaction and its expected sequence number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProposalKey {
    pub address: Address,
    pub key_index: u32,
    pub sequence_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSignature {
    pub address: Address,
    /// Position of `address` in the transaction signer list.
    pub signer_index: usize,
    pub key_index: u32,
    pub signature: Vec<u8>,
}

impl Encodable for TransactionSignature {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3)
            .append(&self.signer_index)
            .append(&self.key_index)
            .append(&self.signature);
    }
}

/// A Flow transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub script: Vec<u8>,
    /// JSON-Cadence encoded arguments.
    pub arguments: Vec<Vec<u8>>,
    pub reference_block_id: Identifier,
    pub gas_limit: u64,
    pub proposal_key: ProposalKey,
    pub payer: Address,
    pub authorizers: Vec<Address>,
    pub payload_signatures: Vec<TransactionSignature>,
    pub envelope_signatures: Vec<TransactionSignature>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, script: impl Into<Vec<u8>>) -> Self {
        self.script = script.into();
        self
    }

    pub fn with_argument(mut self, argument: &Value) -> Self {
        self.arguments.push(argument.encode());
        self
    }

    pub fn with_reference_block_id(mut self, id: Identifier) -> Self {
        self.reference_block_id = id;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_proposal_key(mut self, address: Address, key_index: u32, sequence_number: u64) -> Self {
        self.proposal_key = ProposalKey {
            address,
            key_index,
            sequence_number,
        };
        self
    }

    pub fn with_payer(mut self, payer: Address) -> Self {
        self.payer = payer;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Address) -> Self {
        self.authorizers.push(authorizer);
        self
    }

    /// Decoded arguments, skipping any that fail to decode.
    pub fn decoded_arguments(&self) -> Vec<Value> {
        self.arguments
            .iter()
            .filter_map(|arg| Value::decode(arg).ok())
            .collect()
    }

    /// Unique signer addresses in order: proposer, payer, then authorizers.
    pub fn signers(&self) -> Vec<Address> {
        let mut signers = Vec::new();
        let candidates = [self.proposal_key.address, self.payer]
            .into_iter()
            .chain(self.authorizers.iter().copied());
        for address in candidates {
            if !signers.contains(&address) {
                signers.push(address);
            }
        }
        signers
    }

    fn signer_index(&self, address: Address) -> Option<usize> {
        self.signers().iter().position(|a| *a == address)
    }

    fn append_payload(&self, s: &mut RlpStream) {
        s.begin_list(9)
            .append(&self.script)
            .append_list::<Vec<u8>, _>(&self.arguments)
            .append(&self.reference_block_id.as_bytes().as_slice())
            .append(&self.gas_limit)
            .append(&self.proposal_key.address.as_bytes().as_slice())
            .append(&self.proposal_key.key_index)
            .append(&self.proposal_key.sequence_number)
            .append(&self.payer.as_bytes().as_slice());
        s.begin_list(self.authorizers.len());
        for authorizer in &self.authorizers {
            s.append(&authorizer.as_bytes().as_slice());
        }
    }

    fn payload_rlp(&self) -> Vec<u8> {
        let mut s = RlpStream::new();
        self.append_payload(&mut s);
        s.out().to_vec()
    }

    fn envelope_rlp(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(2);
        self.append_payload(&mut s);
        s.append_list::<TransactionSignature, _>(&self.payload_signatures);
        s.out().to_vec()
    }

    /// Bytes signed by non-payer signers.
    pub fn payload_message(&self) -> Vec<u8> {
        let mut message = domain_tag().to_vec();
        message.extend(self.payload_rlp());
        message
    }

    /// Bytes signed by the payer.
    pub fn envelope_message(&self) -> Vec<u8> {
        let mut message = domain_tag().to_vec();
        message.extend(self.envelope_rlp());
        message
    }

    /// SHA3-256 of the canonical form including every signature.
    pub fn id(&self) -> Identifier {
        let mut s = RlpStream::new_list(3);
        self.append_payload(&mut s);
        s.append_list::<TransactionSignature, _>(&self.payload_signatures);
        s.append_list::<TransactionSignature, _>(&self.envelope_signatures);
        Identifier::from_bytes(HashAlgorithm::Sha3_256.hash(&s.out()))
    }

    pub fn add_payload_signature(
        &mut self,
        address: Address,
        key_index: u32,
        signature: Vec<u8>,
    ) -> Result<(), ValidationError> {
        let signature = self.signature_for(address, key_index, signature)?;
        self.payload_signatures.push(signature);
        Ok(())
    }

    pub fn add_envelope_signature(
        &mut self,
        address: Address,
        key_index: u32,
        signature: Vec<u8>,
    ) -> Result<(), ValidationError> {
        let signature = self.signature_for(address, key_index, signature)?;
        self.envelope_signatures.push(signature);
        Ok(())
    }

    fn signature_for(
        &self,
        address: Address,
        key_index: u32,
        signature: Vec<u8>,
    ) -> Result<TransactionSignature, ValidationError> {
        let signer_index = self
            .signer_index(address)
            .ok_or_else(|| ValidationError::InvalidSignature {
                address,
                key_index,
                reason: "address is not a signer of this transaction".to_string(),
            })?;
        Ok(TransactionSignature {
            address,
            signer_index,
            key_index,
            signature,
        })
    }

    /// Check the transaction is complete before submission.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut missing_fields = Vec::new();
        if self.script.is_empty() {
            missing_fields.push("script".to_string());
        }
        if self.reference_block_id == Identifier::EMPTY {
            missing_fields.push("reference_block_id".to_string());
        }
        if self.payer == Address::ZERO {
            missing_fields.push("payer".to_string());
        }
        if self.proposal_key.address == Address::ZERO {
            missing_fields.push("proposal_key".to_string());
        }
        if !missing_fields.is_empty() {
            return Err(ValidationError::IncompleteTransaction { missing_fields });
        }

        if self.gas_limit == 0 || self.gas_limit > MAX_GAS_LIMIT {
            return Err(ValidationError::InvalidGasLimit {
                limit: self.gas_limit,
                max: MAX_GAS_LIMIT,
            });
        }

        if !self.envelope_signatures.iter().any(|s| s.address == self.payer) {
            return Err(ValidationError::MissingSignature { address: self.payer });
        }
        Ok(())
    }

    /// Verify an envelope signature against a known account key.
    pub fn verify_envelope_signature(
        &self,
        signature: &TransactionSignature,
        public_key: &PublicKey,
        hash: HashAlgorithm,
    ) -> Result<(), ValidationError> {
        if public_key.verify(hash, &self.envelope_message(), &signature.signature) {
            Ok(())
        } else {
            Err(ValidationError::InvalidSignature {
                address: signature.address,
                key_index: signature.key_index,
                reason: "signature does not match the envelope".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{PrivateKey, SignatureAlgorithm};

    fn service() -> Address {
        Address::from_hex("f8d6e0586b0a20c7").unwrap()
    }

    fn sample() -> Transaction {
        Transaction::new()
            .with_script("transaction {}")
            .with_argument(&Value::string("hello"))
            .with_reference_block_id(Identifier::from_bytes([7; 32]))
            .with_gas_limit(MAX_GAS_LIMIT)
            .with_proposal_key(service(), 0, 42)
            .with_payer(service())
            .with_authorizer(service())
    }

    #[test]
    fn test_signers_are_deduplicated() {
        let other = Address::from_u64(0x01cf_0e2f_2f71_5450);
        let tx = sample().with_authorizer(other);
        assert_eq!(tx.signers(), vec![service(), other]);
    }

    #[test]
    fn test_messages_carry_domain_tag() {
        let tx = sample();
        let payload = tx.payload_message();
        assert_eq!(&payload[..TRANSACTION_DOMAIN_TAG.len()], TRANSACTION_DOMAIN_TAG);
        assert!(payload[TRANSACTION_DOMAIN_TAG.len()..32].iter().all(|b| *b == 0));
        assert_ne!(tx.payload_message(), tx.envelope_message());
    }

    #[test]
    fn test_payload_fields_in_canonical_order() {
        let tx = sample();
        let payload = tx.payload_message();
        let rlp = rlp::Rlp::new(&payload[32..]);

        assert_eq!(rlp.item_count().unwrap(), 9);
        assert_eq!(rlp.at(0).unwrap().data().unwrap(), b"transaction {}");
        assert_eq!(rlp.at(1).unwrap().item_count().unwrap(), 1);
        assert_eq!(rlp.at(2).unwrap().data().unwrap(), &[7u8; 32]);
        assert_eq!(rlp.val_at::<u64>(3).unwrap(), MAX_GAS_LIMIT);
        assert_eq!(rlp.at(4).unwrap().data().unwrap(), service().as_bytes());
        assert_eq!(rlp.val_at::<u32>(5).unwrap(), 0);
        assert_eq!(rlp.val_at::<u64>(6).unwrap(), 42);
        assert_eq!(rlp.at(8).unwrap().item_count().unwrap(), 1);
    }

    #[test]
    fn test_envelope_wraps_payload_and_signatures() {
        let mut tx = sample();
        tx.add_payload_signature(service(), 0, vec![9; 64]).unwrap();
        let envelope = tx.envelope_message();
        let rlp = rlp::Rlp::new(&envelope[32..]);

        assert_eq!(rlp.item_count().unwrap(), 2);
        assert_eq!(rlp.at(0).unwrap().as_raw(), &tx.payload_message()[32..]);
        let signature = rlp.at(1).unwrap().at(0).unwrap();
        assert_eq!(signature.val_at::<usize>(0).unwrap(), 0);
        assert_eq!(signature.val_at::<u32>(1).unwrap(), 0);
        assert_eq!(signature.at(2).unwrap().data().unwrap(), &[9u8; 64]);
    }

    #[test]
    fn test_empty_lists_and_zero_values() {
        let tx = Transaction::new().with_script("s");
        let payload = tx.payload_message();
        let rlp = rlp::Rlp::new(&payload[32..]);
        assert_eq!(rlp.at(1).unwrap().as_raw(), &[0xc0u8]);
        assert_eq!(rlp.at(3).unwrap().as_raw(), &[0x80u8]);
        assert_eq!(rlp.at(8).unwrap().as_raw(), &[0xc0u8]);
    }

    #[test]
    fn test_id_changes_with_signatures() {
        let mut tx = sample();
        let unsigned = tx.id();
        tx.add_envelope_signature(service(), 0, vec![1; 64]).unwrap();
        assert_ne!(tx.id(), unsigned);
        assert_eq!(tx.envelope_signatures[0].signer_index, 0);
    }

    #[test]
    fn test_validate() {
        let tx = Transaction::new();
        assert!(matches!(
            tx.validate(),
            Err(ValidationError::IncompleteTransaction { missing_fields }) if missing_fields.len() == 4
        ));

        let tx = sample().with_gas_limit(0);
        assert!(matches!(tx.validate(), Err(ValidationError::InvalidGasLimit { .. })));

        let tx = sample();
        assert_eq!(
            tx.validate(),
            Err(ValidationError::MissingSignature { address: service() })
        );
    }

    #[test]
    fn test_sign_and_verify_envelope() {
        let key = PrivateKey::from_hex(
            SignatureAlgorithm::EcdsaP256,
            "2272967fd2bd75234ae9037dd4694c1f00baad63a10c35172bf65fbb8ad74b47",
        )
        .unwrap();
        let mut tx = sample();
        let digest = HashAlgorithm::Sha3_256.hash(&tx.envelope_message());
        let signature = key.sign_prehash(&digest).unwrap();
        tx.add_envelope_signature(service(), 0, signature).unwrap();

        tx.validate().unwrap();
        let sig = tx.envelope_signatures[0].clone();
        tx.verify_envelope_signature(&sig, &key.public_key(), HashAlgorithm::Sha3_256)
            .unwrap();
        assert!(tx
            .verify_envelope_signature(&sig, &key.public_key(), HashAlgorithm::Sha2_256)
            .is_err());
    }

    #[test]
    fn test_signature_from_non_signer_rejected() {
        let mut tx = sample();
        let err = tx
            .add_envelope_signature(Address::from_u64(5), 0, vec![])
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidSignature { .. }));
    }
}
