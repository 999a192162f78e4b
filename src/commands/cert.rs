use clap::ArgMatches;
use conclave_review::certificate::{verify_with_key, CertificateEnvelope};
use ed25519_dalek::VerifyingKey;

pub async fn run(matches: &ArgMatches) {
    let envelope = matches.get_one::<String>("envelope").unwrap();
    let public_key_hex = matches.get_one::<String>("public-key").unwrap();

    let key_bytes = match hex::decode(public_key_hex) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("✗ invalid public key hex: {e}");
            std::process::exit(1);
        }
    };

    let key_bytes: [u8; 32] = match key_bytes.try_into() {
        Ok(b) => b,
        Err(_) => {
            eprintln!("✗ public key must be exactly 32 bytes");
            std::process::exit(1);
        }
    };

    let verifying_key = match VerifyingKey::from_bytes(&key_bytes) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("✗ invalid ed25519 public key: {e}");
            std::process::exit(1);
        }
    };

    match verify_with_key(&CertificateEnvelope(envelope.clone()), &verifying_key) {
        Ok(payload) => {
            println!("✓ signature valid");
            println!("  scope:     {}", payload.scope_id);
            println!("  decision:  {:?}", payload.decision.decision);
            println!("  issued at: {}", payload.issued_at);
        }
        Err(e) => {
            eprintln!("✗ certificate invalid: {e}");
            std::process::exit(1);
        }
    }
}
