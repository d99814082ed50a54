//! Concurrency tests for the in-memory key store
//!
//! Many threads hammer the same store; the final state must match some
//! serial ordering of the operations.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::SystemTime;

use auth::{AuthError, InMemoryKeyRepository, Key, KeyRepository, KeyType};

const THREADS: usize = 16;
const KEYS_PER_THREAD: usize = 200;

fn make_key(issuer: &str, id: &str) -> Key {
    Key {
        id: id.to_string(),
        issuer: issuer.to_string(),
        key_type: KeyType::Service,
        issued_at: SystemTime::UNIX_EPOCH,
        expires_at: None,
        secret: None,
    }
}

#[test]
fn test_concurrent_saves_of_same_key_admit_exactly_one() {
    let repo = Arc::new(InMemoryKeyRepository::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let repo = Arc::clone(&repo);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..KEYS_PER_THREAD)
                    .filter(|i| repo.save(make_key("alice", &format!("k{}", i))).is_ok())
                    .count()
            })
        })
        .collect();

    let total_ok: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // Every id was won by exactly one thread
    assert_eq!(total_ok, KEYS_PER_THREAD);
    assert_eq!(repo.len(), KEYS_PER_THREAD);
}

#[test]
fn test_concurrent_disjoint_issuers() {
    let repo = Arc::new(InMemoryKeyRepository::new());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                let issuer = format!("issuer-{}", t);
                for i in 0..KEYS_PER_THREAD {
                    let id = format!("k{}", i);
                    repo.save(make_key(&issuer, &id)).unwrap();
                    assert_eq!(repo.retrieve(&issuer, &id).unwrap().issuer, issuer);
                    // Even ids are removed again
                    if i % 2 == 0 {
                        repo.remove(&issuer, &id).unwrap();
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(repo.len(), THREADS * KEYS_PER_THREAD / 2);
    for t in 0..THREADS {
        let issuer = format!("issuer-{}", t);
        assert_eq!(repo.retrieve(&issuer, "k0"), Err(AuthError::NotFound));
        assert!(repo.retrieve(&issuer, "k1").is_ok());
    }
}

#[test]
fn test_concurrent_foreign_removes_never_delete() {
    let repo = Arc::new(InMemoryKeyRepository::new());
    for i in 0..KEYS_PER_THREAD {
        repo.save(make_key("owner", &format!("k{}", i))).unwrap();
    }

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                let intruder = format!("intruder-{}", t);
                for i in 0..KEYS_PER_THREAD {
                    repo.remove(&intruder, &format!("k{}", i)).unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(repo.len(), KEYS_PER_THREAD);
}

#[test]
fn test_concurrent_save_remove_race_stays_consistent() {
    let repo = Arc::new(InMemoryKeyRepository::new());
    let barrier = Arc::new(Barrier::new(2));

    let saver = {
        let repo = Arc::clone(&repo);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for _ in 0..1000 {
                let _ = repo.save(make_key("alice", "contended"));
            }
        })
    };
    let remover = {
        let repo = Arc::clone(&repo);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for _ in 0..1000 {
                repo.remove("alice", "contended").unwrap();
            }
        })
    };

    saver.join().unwrap();
    remover.join().unwrap();

    // Either the last save or the last remove won; never a duplicate
    assert!(repo.len() <= 1);
    match repo.retrieve("alice", "contended") {
        Ok(key) => assert_eq!(key.issuer, "alice"),
        Err(err) => assert_eq!(err, AuthError::NotFound),
    }
}
