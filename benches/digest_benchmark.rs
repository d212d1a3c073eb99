use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ring::agreement::{EphemeralPrivateKey, ECDH_P256};
use ring::rand::SystemRandom;
use vaultgate::digest::{self, DigestScope};
use vaultgate::jsonrpc::{Method, Request};
use vaultgate::threshold::{self, VaultPublicKey};
use vaultgate::types::{CreateSecretsRequest, EncryptedSecret, SecretIdentifier};

fn create_request(items: usize) -> Request<CreateSecretsRequest> {
    let encrypted_secrets = (0..items)
        .map(|i| EncryptedSecret {
            id: SecretIdentifier {
                key: format!("secret-{i}"),
                namespace: "main".into(),
                owner: "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".into(),
            },
            encrypted_value: "ab".repeat(160),
        })
        .collect();
    Request::new(
        "bench",
        Method::SecretsCreate,
        CreateSecretsRequest {
            request_id: "bench".into(),
            encrypted_secrets,
        },
    )
}

fn benchmark_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest");
    for items in [1, 5, 10] {
        let request = create_request(items);
        group.bench_with_input(BenchmarkId::from_parameter(items), &request, |b, req| {
            b.iter(|| digest::compute(black_box(req), DigestScope::Request).unwrap())
        });
    }
    group.finish();
}

fn benchmark_seal(c: &mut Criterion) {
    let rng = SystemRandom::new();
    let recipient = EphemeralPrivateKey::generate(&ECDH_P256, &rng).unwrap();
    let public_key = VaultPublicKey::from_bytes(recipient.compute_public_key().unwrap().as_ref().to_vec()).unwrap();
    let owner = ethabi::Address::repeat_byte(0x5a);

    c.bench_function("seal_secret", |b| {
        b.iter(|| threshold::seal_secret(black_box("a-secret-value"), &public_key, &owner).unwrap())
    });
}

criterion_group!(benches, benchmark_digest, benchmark_seal);
criterion_main!(benches);
