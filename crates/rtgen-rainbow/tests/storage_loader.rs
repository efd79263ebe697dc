//! Storage loader integration tests
//!
//! Shard files are written by hand so every record outcome (insert,
//! collision, malformed, unroutable) can be checked against the SQLite store.

mod common;

use common::{CancellingStore, PoisonedStore, TestEnv, shard_contents};
use rtgen_rainbow::app::loader::{StorageLoader, load_tables};
use rtgen_rainbow::{CancelToken, Error};

#[test]
fn test_collision_first_writer_wins() {
    let env = TestEnv::new();
    let config = env.config(4, 4, 1, "");
    env.write_shard(&config, 0, "abcd WXYZ\nefgh WXYZ\n");

    let store = env.store(&config);
    let report = StorageLoader::new(&config, &store).run().unwrap();

    let totals = report.totals();
    assert_eq!(totals.inserted, 1);
    assert_eq!(totals.duplicates, 1);
    assert_eq!(env.count_rows("table_4"), 1);
    assert_eq!(env.seed_for("table_4", "WXYZ").as_deref(), Some("abcd"));
}

#[test]
fn test_collision_smallest_seed_policy() {
    let env = TestEnv::new();
    let config = env.config(4, 4, 1, r#", "duplicatePolicy": "smallestSeed""#);
    env.write_shard(&config, 0, "mmmm AAAA\nbbbb AAAA\nzzzz AAAA\n");

    let store = env.store(&config);
    let report = StorageLoader::new(&config, &store).run().unwrap();

    assert_eq!(report.totals().duplicates, 2);
    assert_eq!(env.seed_for("table_4", "AAAA").as_deref(), Some("bbbb"));
}

#[test]
fn test_malformed_lines_skipped() {
    let env = TestEnv::new();
    let config = env.config(3, 4, 1, "");
    env.write_shard(
        &config,
        0,
        "abcdWXYZ\nabc WXYZ\n\nab cd ef\n efg\nabcd QRST\n",
    );

    let store = env.store(&config);
    let report = StorageLoader::new(&config, &store).run().unwrap();

    let totals = report.totals();
    assert_eq!(totals.malformed, 5);
    assert_eq!(totals.inserted, 1);
    assert_eq!(env.count_rows("table_3"), 0);
    assert_eq!(env.rows("table_4"), vec![("abcd".into(), "QRST".into())]);
}

#[test]
fn test_rows_routed_by_length() {
    let env = TestEnv::new();
    let config = env.config(3, 5, 1, "");
    env.write_shard(&config, 0, "abc XYZ\nabcd WXYZ\nabcde VWXYZ\nabcdefg TUVWXYZ\n");

    let store = env.store(&config);
    let report = StorageLoader::new(&config, &store).run().unwrap();

    assert_eq!(env.count_rows("table_3"), 1);
    assert_eq!(env.count_rows("table_4"), 1);
    assert_eq!(env.count_rows("table_5"), 1);

    let per_length = report.per_length();
    assert_eq!(per_length[&4].inserted, 1);
    assert_eq!(per_length[&7].unroutable, 1);
    assert_eq!(report.totals().unroutable, 1);
}

#[test]
fn test_batches_committed() {
    let env = TestEnv::new();
    let config = env.config(2, 2, 1, r#", "buffSize": 2"#);
    env.write_shard(&config, 0, "aa AA\nbb BB\ncc CC\ndd DD\nee EE\n");

    let store = env.store(&config);
    StorageLoader::new(&config, &store).run().unwrap();

    assert_eq!(env.count_rows("table_2"), 5);
}

#[test]
fn test_separator_configurable() {
    let env = TestEnv::new();
    let config = env.config(4, 4, 1, r#", "separator": ";""#);
    env.write_shard(&config, 0, "abcd;WXYZ\nefgh WXYZ\n");

    let store = env.store(&config);
    let report = StorageLoader::new(&config, &store).run().unwrap();

    assert_eq!(report.totals().inserted, 1);
    assert_eq!(report.totals().malformed, 1);
}

#[test]
fn test_overlapping_shards_in_parallel() {
    let env = TestEnv::new();
    let config = env.config(4, 4, 4, "");
    for worker in 0..6 {
        // Every shard shares terminal AAAA and has one private terminal
        let contents = format!("s{:03} AAAA\np{:03} B{:03}\n", worker, worker, worker);
        env.write_shard(&config, worker, &contents);
    }

    let store = env.store(&config);
    let report = StorageLoader::new(&config, &store).run().unwrap();

    assert_eq!(report.shards.len(), 6);
    let totals = report.totals();
    assert_eq!(totals.inserted, 7);
    assert_eq!(totals.duplicates, 5);
    assert_eq!(env.count_rows("table_4"), 7);
}

#[test]
fn test_multi_batch_shards_share_the_writer() {
    let env = TestEnv::new();
    let mut config = env.config(4, 4, 8, r#", "buffSize": 50"#);
    // Far below the time any shard needs to load
    config.sqlite_config.as_mut().unwrap().busy_timeout_ms = 20;
    for worker in 0..8 {
        // Each shard overlaps the next by half
        env.write_shard(&config, worker, &shard_contents(worker * 500, 1000));
    }

    let store = env.store(&config);
    let report = StorageLoader::new(&config, &store).run().unwrap();

    assert_eq!(report.shards.len(), 8);
    for shard in &report.shards {
        assert_eq!(shard.counts.inserted + shard.counts.duplicates, 1000);
    }
    let totals = report.totals();
    assert_eq!(totals.inserted, 4500);
    assert_eq!(totals.duplicates, 3500);
    assert_eq!(env.count_rows("table_4"), 4500);
}

#[test]
fn test_reload_is_idempotent() {
    let env = TestEnv::new();
    let config = env.config(4, 4, 1, "");
    env.write_shard(&config, 0, "abcd WXYZ\nefgh QRST\n");

    let store = env.store(&config);
    StorageLoader::new(&config, &store).run().unwrap();
    let report = StorageLoader::new(&config, &store).run().unwrap();

    assert_eq!(report.totals().inserted, 0);
    assert_eq!(report.totals().duplicates, 2);
    assert_eq!(env.count_rows("table_4"), 2);
}

#[test]
fn test_insert_failure_only_aborts_its_shard() {
    let env = TestEnv::new();
    let config = env.config(4, 4, 2, "");
    env.write_shard(&config, 0, "good AAAA\nbadd BBBB\nlost CCCC\n");
    env.write_shard(&config, 1, "fine DDDD\nokay EEEE\n");

    let store = PoisonedStore {
        inner: env.store(&config),
        poison_seed: "badd".into(),
    };
    let result = StorageLoader::new(&config, &store).run();

    assert!(matches!(result, Err(Error::Insert { ref table, .. }) if table == "table_4"));
    // Rows before the failure are kept, the rest of that shard is not loaded
    assert_eq!(env.seed_for("table_4", "AAAA").as_deref(), Some("good"));
    assert_eq!(env.seed_for("table_4", "CCCC"), None);
    // The sibling shard is fully loaded
    assert_eq!(env.seed_for("table_4", "DDDD").as_deref(), Some("fine"));
    assert_eq!(env.seed_for("table_4", "EEEE").as_deref(), Some("okay"));
}

#[test]
fn test_no_shards_still_creates_schema() {
    let env = TestEnv::new();
    let config = env.config(4, 5, 1, "");
    std::fs::create_dir_all(config.generator_folder()).unwrap();

    let store = env.store(&config);
    let report = StorageLoader::new(&config, &store).run().unwrap();

    assert!(report.shards.is_empty());
    assert_eq!(env.count_rows("table_4"), 0);
    assert_eq!(env.count_rows("table_5"), 0);
}

#[test]
fn test_missing_generator_folder() {
    let env = TestEnv::new();
    let config = env.config(4, 4, 1, "");

    let store = env.store(&config);
    let result = StorageLoader::new(&config, &store).run();
    assert!(matches!(result, Err(Error::Io { .. })));
}

#[test]
fn test_cancelled_load() {
    let env = TestEnv::new();
    let config = env.config(4, 4, 1, "");
    env.write_shard(&config, 0, "abcd WXYZ\n");

    let cancel = CancelToken::new();
    cancel.cancel();
    let store = env.store(&config);
    let result = StorageLoader::new(&config, &store)
        .with_cancel(cancel)
        .run();

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(env.count_rows("table_4"), 0);
}

#[test]
fn test_cancel_mid_load_commits_open_batch() {
    let env = TestEnv::new();
    let config = env.config(4, 4, 1, r#", "buffSize": 10"#);
    env.write_shard(&config, 0, &shard_contents(0, 50));

    let cancel = CancelToken::new();
    // Cancelled halfway through the second batch
    let store = CancellingStore::new(env.store(&config), cancel.clone(), 15);
    let result = StorageLoader::new(&config, &store)
        .with_cancel(cancel)
        .run();

    assert!(matches!(result, Err(Error::Cancelled)));
    // Both started batches are committed, nothing after them is read
    assert_eq!(env.count_rows("table_4"), 20);
}

#[test]
fn test_load_tables_missing_store_config() {
    let env = TestEnv::new();
    let mut config = env.config(4, 4, 1, "");
    config.sqlite_config = None;

    assert!(matches!(
        load_tables(&config),
        Err(Error::MissingStoreConfig { .. })
    ));
}
