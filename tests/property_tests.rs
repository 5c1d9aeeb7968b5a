//! Randomized property checks for the provisioning core
//!
//! Each property runs over many seeded random cases so failures reproduce.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use server::distribution::{DistributionSession, UploadLimits};
use server::error::ErrorKind;
use server::gateway::ServerRecord;
use server::paths::VolumeResolver;
use server::sanitize::clean;
use server::scanner::{classify, scan, Eligibility};
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

const CASES: u64 = 64;

fn roster(root: &TempDir, count: usize) -> Vec<ServerRecord> {
    (0..count)
        .map(|i| {
            let id = format!("node-{:03}", i);
            fs::create_dir_all(root.path().join(&id).join("session")).unwrap();
            ServerRecord::new(id, format!("Node {}", i), i as u64)
        })
        .collect()
}

/// An upload that is either acceptable or broken in one of several ways
fn random_upload(rng: &mut StdRng) -> (String, Vec<u8>, bool) {
    let n: u32 = rng.gen();
    match rng.gen_range(0..5) {
        0 => (format!("c{}.json", n), format!("{{\"n\":{}}}", n).into_bytes(), true),
        1 => (format!("c{}.JSON", n), format!("{}\n[{}]", n, n).into_bytes(), true),
        2 => (format!("c{}.txt", n), b"{}".to_vec(), false),
        3 => (format!("c{}.json", n), b"not json at all".to_vec(), false),
        _ => (format!("c{}.json", n), vec![0xff, 0xfe, b'{', b'}'], false),
    }
}

/// |assignments| == min(valid uploads, eligible servers), all targets distinct, FIFO order
#[test]
fn consume_assigns_each_server_at_most_once() {
    for seed in 0..CASES {
        let mut rng = StdRng::seed_from_u64(seed);
        let root = TempDir::new().unwrap();
        let servers = roster(&root, rng.gen_range(0..8));
        let resolver = VolumeResolver::with_candidates(vec![root.path().to_path_buf()]);
        let limits = UploadLimits::default();
        let mut session = DistributionSession::begin(1, servers.clone());

        let mut valid = 0;
        for _ in 0..rng.gen_range(0..16) {
            let (name, bytes, ok) = random_upload(&mut rng);
            if ok {
                valid += 1;
            }
            match session.consume(&bytes, &name, &resolver, &limits) {
                Ok(_) => assert!(ok, "seed {}: {} should have been rejected", seed, name),
                Err(e) if ok => assert_eq!(e.kind(), ErrorKind::QueueExhausted, "seed {}", seed),
                Err(e) => assert_eq!(e.kind(), ErrorKind::Validation, "seed {}", seed),
            }
        }

        let assignments = session.assignments();
        assert_eq!(assignments.len(), valid.min(servers.len()), "seed {}", seed);

        let targets: HashSet<&str> = assignments
            .iter()
            .map(|a| a.target.identifier.as_str())
            .collect();
        assert_eq!(targets.len(), assignments.len(), "seed {}", seed);

        for (assignment, server) in assignments.iter().zip(&servers) {
            assert_eq!(&assignment.target, server, "seed {}", seed);
        }
        assert_eq!(
            session.remaining() + assignments.len(),
            servers.len(),
            "seed {}",
            seed
        );
    }
}

/// Every server lands in exactly one bucket and eligible servers keep roster order
#[test]
fn scan_partitions_the_roster() {
    for seed in 0..CASES {
        let mut rng = StdRng::seed_from_u64(seed);
        let root = TempDir::new().unwrap();
        let count = rng.gen_range(0..12);

        let mut servers = Vec::new();
        for i in 0..count {
            let id = format!("vol-{:02}", i);
            let server_path = root.path().join(&id);
            match rng.gen_range(0..4) {
                0 => {}
                1 => fs::create_dir_all(&server_path).unwrap(),
                2 => fs::create_dir_all(server_path.join("session")).unwrap(),
                _ => {
                    fs::create_dir_all(server_path.join("session")).unwrap();
                    fs::write(server_path.join("session/creds.json"), "{}").unwrap();
                }
            }
            servers.push(ServerRecord::new(id, format!("Vol {}", i), 1));
        }
        servers.shuffle(&mut rng);

        let resolver = VolumeResolver::with_candidates(vec![root.path().to_path_buf()]);
        let report = scan(&resolver, &servers);
        assert_eq!(report.total(), servers.len(), "seed {}", seed);

        let expected: Vec<ServerRecord> = servers
            .iter()
            .filter(|s| classify(&resolver, s) == Eligibility::Eligible)
            .cloned()
            .collect();
        assert_eq!(report.eligible, expected, "seed {}", seed);
    }
}

fn random_json(rng: &mut StdRng) -> String {
    let key: String = (0..rng.gen_range(1..8))
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect();
    match rng.gen_range(0..3) {
        0 => format!("{{\"{}\":{}}}", key, rng.gen::<i32>()),
        1 => format!("[\"{}\",{{\"nested\":[1,2,\"}}\"]}}]", key),
        _ => format!("{{\"{}\":\"brace {{ in string\"}}", key),
    }
}

fn decorate(rng: &mut StdRng, json: &str) -> String {
    let mut text = String::new();
    if rng.gen_bool(0.5) {
        text.push_str(&rng.gen_range(0..10_000).to_string());
    }
    if rng.gen_bool(0.5) {
        text.push('\u{feff}');
    }
    if rng.gen_bool(0.3) {
        text.push_str("here you go: ");
    }
    text.push_str(json);
    for _ in 0..rng.gen_range(0..3) {
        text.push(['\n', ' ', '\t', '\r'][rng.gen_range(0..4)]);
    }
    text
}

/// Cleaning recovers the payload and cleaning again changes nothing
#[test]
fn sanitizer_is_idempotent() {
    for seed in 0..CASES {
        let mut rng = StdRng::seed_from_u64(seed);
        let json = random_json(&mut rng);
        let raw = decorate(&mut rng, &json);

        let once = clean(&raw).unwrap_or_else(|e| panic!("seed {}: {:?}: {}", seed, raw, e));
        assert_eq!(once, json, "seed {}", seed);
        assert_eq!(clean(&once).unwrap(), once, "seed {}", seed);
    }
}
