//! Fixed transaction scripts for account and contract management.

use crate::{
    cadence::Value,
    contracts::Parameter,
    crypto::{HashAlgorithm, PublicKey, SignatureAlgorithm},
    flow::Transaction,
};

/// Full key weight; a single key at this weight can sign alone.
pub const FULL_KEY_WEIGHT: u32 = 1000;

pub const UPDATE_CONTRACT: &str = r#"transaction(name: String, code: String) {
    prepare(signer: auth(UpdateContract) &Account) {
        signer.contracts.update(name: name, code: code.decodeHex())
    }
}
"#;

pub const CREATE_ACCOUNT: &str = r#"transaction(publicKeys: [String], signatureAlgorithms: [UInt8], hashAlgorithms: [UInt8], weights: [UFix64], contracts: {String: String}) {
    prepare(signer: auth(BorrowValue) &Account) {
        let account = Account(payer: signer)
        var i = 0
        while i < publicKeys.length {
            account.keys.add(
                publicKey: PublicKey(
                    publicKey: publicKeys[i].decodeHex(),
                    signatureAlgorithm: SignatureAlgorithm(rawValue: signatureAlgorithms[i])!
                ),
                hashAlgorithm: HashAlgorithm(rawValue: hashAlgorithms[i])!,
                weight: weights[i]
            )
            i = i + 1
        }
        for name in contracts.keys {
            account.contracts.add(name: name, code: contracts[name]!.decodeHex())
        }
    }
}
"#;

/// The add-contract script, declaring and forwarding the initializer's parameters.
pub fn add_contract_script(init_parameters: &[Parameter]) -> String {
    let declared: String = init_parameters
        .iter()
        .enumerate()
        .map(|(i, p)| format!(", arg{i}: {}", p.ty))
        .collect();
    let forwarded: String = (0..init_parameters.len())
        .map(|i| format!(", arg{i}"))
        .collect();

    format!(
        r#"transaction(name: String, code: String{declared}) {{
    prepare(signer: auth(AddContract) &Account) {{
        signer.contracts.add(name: name, code: code.decodeHex(){forwarded})
    }}
}}
"#
    )
}

/// Deploy `code` as contract `name`, passing `args` to its initializer.
pub fn add_contract(name: &str, code: &str, init_parameters: &[Parameter], args: &[Value]) -> Transaction {
    args.iter().fold(
        Transaction::new()
            .with_script(add_contract_script(init_parameters))
            .with_argument(&Value::string(name))
            .with_argument(&Value::string(hex::encode(code))),
        |tx, arg| tx.with_argument(arg),
    )
}

/// Replace the code of the deployed contract `name`.
pub fn update_contract(name: &str, code: &str) -> Transaction {
    Transaction::new()
        .with_script(UPDATE_CONTRACT)
        .with_argument(&Value::string(name))
        .with_argument(&Value::string(hex::encode(code)))
}

/// A key to register on a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccountKey {
    pub public_key: PublicKey,
    pub hash_algorithm: HashAlgorithm,
    pub weight: u32,
}

impl NewAccountKey {
    pub fn new(public_key: PublicKey, hash_algorithm: HashAlgorithm) -> Self {
        Self {
            public_key,
            hash_algorithm,
            weight: FULL_KEY_WEIGHT,
        }
    }
}

// Raw values of the on-chain enums, which differ from the protocol codes.
fn signature_raw_value(algorithm: SignatureAlgorithm) -> u8 {
    match algorithm {
        SignatureAlgorithm::EcdsaP256 => 1,
        SignatureAlgorithm::EcdsaSecp256k1 => 2,
    }
}

fn hash_raw_value(algorithm: HashAlgorithm) -> u8 {
    match algorithm {
        HashAlgorithm::Sha2_256 => 1,
        HashAlgorithm::Sha3_256 => 3,
    }
}

fn uint8(value: u8) -> Value {
    Value::Number {
        ty: "UInt8".to_string(),
        value: value.to_string(),
    }
}

/// Create an account paid for by the proposer, with `keys` and initial `contracts`.
pub fn create_account(keys: &[NewAccountKey], contracts: &[(String, String)]) -> Transaction {
    let public_keys = keys
        .iter()
        .map(|k| Value::string(k.public_key.to_hex()))
        .collect();
    let signature_algorithms = keys
        .iter()
        .map(|k| uint8(signature_raw_value(k.public_key.algorithm())))
        .collect();
    let hash_algorithms = keys
        .iter()
        .map(|k| uint8(hash_raw_value(k.hash_algorithm)))
        .collect();
    let weights = keys
        .iter()
        .map(|k| Value::ufix64(&format!("{}.00000000", k.weight)))
        .collect();
    let contracts = contracts
        .iter()
        .map(|(name, code)| (Value::string(name), Value::string(hex::encode(code))))
        .collect();

    Transaction::new()
        .with_script(CREATE_ACCOUNT)
        .with_argument(&Value::Array(public_keys))
        .with_argument(&Value::Array(signature_algorithms))
        .with_argument(&Value::Array(hash_algorithms))
        .with_argument(&Value::Array(weights))
        .with_argument(&Value::Dictionary(contracts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_contract_forwards_init_arguments() {
        let params = vec![Parameter {
            name: "supply".to_string(),
            ty: "UFix64".to_string(),
        }];
        let tx = add_contract("Token", "access(all) contract Token {}", &params, &[Value::ufix64("10.0")]);
        let script = String::from_utf8(tx.script.clone()).unwrap();

        assert!(script.starts_with("transaction(name: String, code: String, arg0: UFix64) {"));
        assert!(script.contains("signer.contracts.add(name: name, code: code.decodeHex(), arg0)"));

        let args = tx.decoded_arguments();
        assert_eq!(args[0], Value::string("Token"));
        assert_eq!(args[1], Value::string(hex::encode("access(all) contract Token {}")));
        assert_eq!(args[2], Value::ufix64("10.0"));
    }

    #[test]
    fn test_add_contract_without_init_arguments() {
        let tx = add_contract("A", "access(all) contract A {}", &[], &[]);
        let script = String::from_utf8(tx.script).unwrap();
        assert!(script.starts_with("transaction(name: String, code: String) {"));
        assert!(script.contains("code.decodeHex())\n"));
        assert_eq!(tx.arguments.len(), 2);
    }

    #[test]
    fn test_update_contract() {
        let tx = update_contract("A", "access(all) contract A {}");
        assert_eq!(tx.script, UPDATE_CONTRACT.as_bytes());
        assert_eq!(tx.decoded_arguments()[0], Value::string("A"));
    }
}
