use enrich::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        env::remove_var("ENRICH_PROFILE");
        env::remove_var("ENRICH_API_BIND_ADDR");
        env::remove_var("ENRICH_LOG_LEVEL");
        env::remove_var("ENRICH_ACTOR_TOKENS");
        env::remove_var("ENRICH_ADMIN_ACTORS");
        env::remove_var("ENRICH_RATE_LIMIT_MAX_CALLS");
        env::remove_var("ENRICH_RETRY_MODEL_BASE_DELAY_MS");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_only_tokens_are_set() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("ENRICH_ACTOR_TOKENS", "alice:tok-alice");
    }

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.rate_limit.max_calls, 10);
    assert_eq!(cfg.retry.model_max_retries, 3);
    assert_eq!(cfg.executor.tick_ms, 5000);
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn missing_actor_tokens_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());

    assert!(matches!(
        loader.load(),
        Err(ConfigError::MissingActorTokens)
    ));
    clear_env();
}

#[test]
fn malformed_actor_token_entry_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("ENRICH_ACTOR_TOKENS", "missing-separator");
    }

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    assert!(matches!(
        loader.load(),
        Err(ConfigError::InvalidActorTokenEntry { .. })
    ));
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "ENRICH_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "ENRICH_API_BIND_ADDR=192.168.0.10:5000\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "ENRICH_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "ENRICH_PROFILE=test\nENRICH_API_BIND_ADDR=127.0.0.1:4000\nENRICH_ACTOR_TOKENS=alice:tok-alice\n",
    );

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("layered config loads");

    assert_eq!(cfg.profile, "test");
    // Most specific file wins: .env.test.local over .env.test over .env.
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    clear_env();
}

#[test]
fn process_environment_overrides_env_files() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "ENRICH_ACTOR_TOKENS=alice:tok-alice\nENRICH_RATE_LIMIT_MAX_CALLS=5\n",
    );

    unsafe {
        env::set_var("ENRICH_RATE_LIMIT_MAX_CALLS", "25");
    }

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.rate_limit.max_calls, 25);
    clear_env();
}

#[test]
fn admin_actors_parse_comma_separated() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("ENRICH_ACTOR_TOKENS", "alice:tok-alice,root:tok-root");
        env::set_var("ENRICH_ADMIN_ACTORS", "root, ops");
    }

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.admin_actors, vec!["root".to_string(), "ops".to_string()]);
    clear_env();
}

#[test]
fn retry_bounds_violation_fails_validation() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "ENRICH_ACTOR_TOKENS=alice:tok-alice\n\
         ENRICH_RETRY_MODEL_BASE_DELAY_MS=120000\n",
    );

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    assert!(matches!(
        loader.load(),
        Err(ConfigError::InvalidRetryBounds { profile: "model", .. })
    ));
    clear_env();
}
