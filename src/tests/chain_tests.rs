// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::hash::{Hash, EMPTY_HASH};
use crate::hashchain::{self, keys, ChainError, ChainState, HashChain};
use crate::verify::verify_hashchain;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_threshold_changes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hashchain");
    let p1 = keys::generate_key();
    let p2 = keys::generate_key();

    let mut chain = HashChain::start(&path, &p1, "first").unwrap();
    assert_eq!((chain.state().m(), chain.state().n()), (1, 1));

    chain.add_key(&p2, 2, "second").unwrap();
    assert_eq!(chain.state().n(), 3);

    chain.signature_control(2).unwrap();
    assert_eq!(chain.state().m(), 2);

    assert!(matches!(
        chain.signature_control(4),
        Err(ChainError::MLargerThanN { m: 4, n: 3, .. })
    ));
    assert_eq!(chain.len(), 3);
}

#[test]
fn test_append_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hashchain");
    let key = keys::generate_key();
    let other = keys::generate_key();

    let mut chain = HashChain::start(&path, &key, "").unwrap();
    chain.source(Hash::digest(b"v1"), &key, "v1").unwrap();
    let before_bytes = fs::read(&path).unwrap();
    let before_hashes: Vec<Hash> = chain.links().iter().map(|l| l.hash()).collect();
    verify_hashchain(&path).unwrap();

    chain.add_key(&other, 1, "other").unwrap();
    chain.signature_control(2).unwrap();
    chain.sign(3, &key).unwrap();
    chain.source(Hash::digest(b"v2"), &key, "v2").unwrap();

    let after_bytes = fs::read(&path).unwrap();
    assert!(after_bytes.starts_with(&before_bytes));
    let after_hashes: Vec<Hash> = chain.links().iter().map(|l| l.hash()).collect();
    assert_eq!(&after_hashes[..before_hashes.len()], &before_hashes[..]);

    let proof = verify_hashchain(&path).unwrap();
    assert_eq!(proof.lines, 6);
    assert_eq!(proof.head, Some(chain.head()));
    assert_eq!((proof.m, proof.n), (2, 2));
    // the signature on line 4 is not yet countersigned by the new key
    assert_eq!(proof.signed_line, 3);
    assert_eq!(proof.last_signed_tree_hash, Hash::digest(b"v1"));
    assert_eq!(proof.signers.len(), 2);
}

#[test]
fn test_threshold_invariant_holds_on_replay() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hashchain");
    let signers: Vec<_> = (0..4).map(|_| keys::generate_key()).collect();

    let mut chain = HashChain::start(&path, &signers[0], "").unwrap();
    for (i, key) in signers.iter().enumerate().skip(1) {
        chain.add_key(key, i as u32, "").unwrap();
    }
    assert_eq!(chain.state().n(), 7);
    chain.signature_control(4).unwrap();
    chain.remove_key(signers[3].verifying_key()).unwrap();
    assert!(matches!(
        chain.remove_key(signers[2].verifying_key()),
        Err(ChainError::MLargerThanN { m: 4, n: 2, .. })
    ));
    chain.close();

    let links = hashchain::read_links(&path).unwrap();
    assert_eq!(links.len(), 6);
    let mut state = ChainState::default();
    for link in &links {
        state = state.apply_link(link).unwrap();
        assert!(1 <= state.m() && state.m() <= state.n());
    }
    assert_eq!((state.m(), state.n()), (4, 4));
}

#[test]
fn test_tampered_file_fails_verification() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hashchain");
    let key = keys::generate_key();
    let mut chain = HashChain::start(&path, &key, "").unwrap();
    chain.source(Hash::digest(b"v1"), &key, "release one").unwrap();
    chain.source(Hash::digest(b"v2"), &key, "release two").unwrap();
    chain.close();

    let text = fs::read_to_string(&path).unwrap();
    fs::write(&path, text.replace("release one", "release 1!")).unwrap();
    assert!(matches!(
        verify_hashchain(&path),
        Err(ChainError::InvalidSignature { line: 1 })
    ));

    let mut lines: Vec<&str> = text.lines().collect();
    lines.swap(1, 2);
    fs::write(&path, lines.join("\n") + "\n").unwrap();
    assert!(matches!(
        verify_hashchain(&path),
        Err(ChainError::LinkBroken { line: 1 })
    ));

    fs::write(&path, "").unwrap();
    assert!(matches!(verify_hashchain(&path), Err(ChainError::Empty(_))));
}

#[test]
fn test_merge_scenarios() {
    let dir = tempdir().unwrap();
    let key = keys::generate_key();
    let base = dir.path().join("base");

    let mut chain = HashChain::start(&base, &key, "").unwrap();
    chain.source(Hash::digest(b"one"), &key, "").unwrap();
    chain.source(Hash::digest(b"two"), &key, "").unwrap();
    chain.close();

    let ours = dir.path().join("ours");
    let theirs = dir.path().join("theirs");
    fs::copy(&base, &ours).unwrap();
    fs::copy(&base, &theirs).unwrap();

    let mut a = HashChain::open(&ours).unwrap();
    let mut b = HashChain::open(&theirs).unwrap();
    a.source(Hash::digest(b"ours"), &key, "").unwrap();
    b.source(Hash::digest(b"theirs"), &key, "").unwrap();
    b.source(Hash::digest(b"more"), &key, "").unwrap();

    assert!(matches!(a.merge(b.links()), Err(ChainError::CannotMerge { line: 3 })));

    let prefix = hashchain::read_links(&base).unwrap();
    assert!(matches!(b.merge(&prefix), Err(ChainError::NothingToMerge)));
    let own = b.links().to_vec();
    assert!(matches!(b.merge(&own), Err(ChainError::NothingToMerge)));

    let mut c = HashChain::open(&base).unwrap();
    assert_eq!(c.merge(b.links()).unwrap(), 2);
    assert_eq!(c.state().tree_hashes().len(), 5);
    assert_eq!(c.state().tree_hashes()[0], EMPTY_HASH);
    c.close();
    b.close();
    assert_eq!(fs::read(&base).unwrap(), fs::read(&theirs).unwrap());
}
