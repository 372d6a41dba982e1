//! Integration tests for reading service access files from disk.

#![cfg(unix)]

mod common;

use common::{TestContext, TWO_SECTIONS};
use serviceaccess::ini::render_section;
use serviceaccess::permissions::PermissionFault;
use serviceaccess::{fetch, CredentialStore, Environment, Lookup, RetryPolicy, ServiceAccessError};
use std::collections::HashMap;
use std::time::Duration;

#[test]
fn test_open_with_restrictive_permissions() {
    let ctx = TestContext::new().unwrap();
    let path = ctx.create_services(".desservices.ini", TWO_SECTIONS, 0o640).unwrap();

    let store = CredentialStore::open(&path).unwrap();
    assert_eq!(store.section_names(), vec!["db-prod", "file-http"]);
    assert_eq!(store.path(), path.as_path());
}

#[test]
fn test_open_with_owner_only_permissions() {
    let ctx = TestContext::new().unwrap();
    let path = ctx.create_services(".desservices.ini", TWO_SECTIONS, 0o600).unwrap();

    assert!(CredentialStore::open(&path).is_ok());
}

#[test]
fn test_world_readable_file_is_rejected() {
    let ctx = TestContext::new().unwrap();
    let path = ctx.create_services(".desservices.ini", TWO_SECTIONS, 0o644).unwrap();

    match CredentialStore::open(&path) {
        Err(ServiceAccessError::Permission { faults, .. }) => {
            assert_eq!(faults, vec![PermissionFault::OtherRead]);
        }
        other => panic!("expected permission error, got {:?}", other),
    }
}

#[test]
fn test_executable_file_is_rejected() {
    let ctx = TestContext::new().unwrap();
    let path = ctx.create_services(".desservices.ini", TWO_SECTIONS, 0o740).unwrap();

    let err = CredentialStore::open(&path).unwrap_err();
    assert!(matches!(err, ServiceAccessError::Permission { .. }));
}

#[test]
fn test_permissions_checked_before_parsing() {
    let ctx = TestContext::new().unwrap();
    let path = ctx
        .create_services(".desservices.ini", "not an ini file at all\n", 0o666)
        .unwrap();

    match CredentialStore::open(&path) {
        Err(ServiceAccessError::Permission { faults, .. }) => {
            assert!(faults.contains(&PermissionFault::GroupWrite));
            assert!(faults.contains(&PermissionFault::OtherRead));
            assert!(faults.contains(&PermissionFault::OtherWrite));
        }
        other => panic!("expected permission error, got {:?}", other),
    }
}

#[test]
fn test_section_returns_only_requested_keys() {
    let ctx = TestContext::new().unwrap();
    let path = ctx.create_services(".desservices.ini", TWO_SECTIONS, 0o640).unwrap();

    let creds = CredentialStore::open(&path).unwrap().section("file-http").unwrap();

    let expected: HashMap<String, String> = [("user", "username"), ("passwd", "userPassword")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert_eq!(creds.entries(), &expected);
    assert_eq!(creds.get("server"), None);
    assert_eq!(creds.section(), "file-http");
    assert_eq!(creds.source(), path.as_path());
}

#[test]
fn test_missing_section() {
    let ctx = TestContext::new().unwrap();
    let path = ctx.create_services(".desservices.ini", TWO_SECTIONS, 0o640).unwrap();
    let store = CredentialStore::open(&path).unwrap();

    let err = store.section("db-test").unwrap_err();
    assert!(matches!(err, ServiceAccessError::SectionNotFound { ref section, .. } if section == "db-test"));

    // Earlier lookups on the same store keep working.
    assert_eq!(store.section("db-prod").unwrap().user(), Some("dbuser"));
}

#[test]
fn test_malformed_file() {
    let ctx = TestContext::new().unwrap();
    let path = ctx
        .create_services(".desservices.ini", "[db]\nuser = a\ngarbage line\n", 0o640)
        .unwrap();

    let err = CredentialStore::open(&path).unwrap_err();
    assert!(matches!(err, ServiceAccessError::Malformed { line: 3, .. }));
}

#[test]
fn test_non_utf8_file_is_malformed() {
    let ctx = TestContext::new().unwrap();
    let path = ctx.create_services("bin.ini", "[db]\n", 0o640).unwrap();
    std::fs::write(&path, b"[db]\nuser = \xff\xfe\n").unwrap();

    let err = CredentialStore::open(&path).unwrap_err();
    assert!(matches!(err, ServiceAccessError::Malformed { line: 2, .. }));
}

#[test]
fn test_missing_file_is_io_error() {
    let ctx = TestContext::new().unwrap();
    let err = CredentialStore::open(ctx.path("nope.ini")).unwrap_err();

    assert!(matches!(err, ServiceAccessError::Io { .. }));
}

#[test]
fn test_render_and_reread_round_trip() {
    let ctx = TestContext::new().unwrap();
    let mut entries = HashMap::new();
    entries.insert("user".to_string(), "username".to_string());
    entries.insert("passwd".to_string(), "p@ss=word;x".to_string());
    entries.insert("url".to_string(), "https://des.example.org/files".to_string());

    let path = ctx
        .create_services("round.ini", &render_section("file-http", &entries).unwrap(), 0o640)
        .unwrap();

    let creds = CredentialStore::open(&path).unwrap().section("file-http").unwrap();
    assert_eq!(creds.into_map(), entries);
}

#[test]
fn test_render_refuses_credentials_that_would_not_read_back() {
    let mut entries = HashMap::new();
    entries.insert("user".to_string(), "dbuser".to_string());
    entries.insert("passwd".to_string(), "pa ;ss".to_string());

    let err = render_section("db-prod", &entries).unwrap_err();
    assert!(matches!(err, ServiceAccessError::Unrepresentable { .. }));
    assert!(!err.to_string().contains("pa ;ss"));

    entries.insert("passwd".to_string(), "pa;ss".to_string());
    entries.insert("Server".to_string(), "db.example.org".to_string());
    let err = render_section("db-prod", &entries).unwrap_err();
    assert!(matches!(err, ServiceAccessError::Unrepresentable { .. }));
}

#[test]
fn test_wellformed_file_with_comments() {
    let text = "
;
;  initial comments in file
;

[db-maximal]
USER=maximal_user
PASSWD  =   maximal_passwd
name    =   maximal_name_1    ; if repeated last name wins
name    =   maximal_name      ; if repeated key, last one wins
type    =   POSTgres
server  =   maximal_server

[db-empty]
; empty section
";
    let ctx = TestContext::new().unwrap();
    let path = ctx.create_services("wellformed.ini", text, 0o600).unwrap();
    let store = CredentialStore::open(&path).unwrap();

    let maximal = store.section("db-maximal").unwrap();
    assert_eq!(maximal.user(), Some("maximal_user"));
    assert_eq!(maximal.passwd(), Some("maximal_passwd"));
    assert_eq!(maximal.get("name"), Some("maximal_name"));
    assert_eq!(maximal.get("type"), Some("POSTgres"));

    assert!(store.section("db-empty").unwrap().is_empty());
}

#[test]
fn test_retry_does_not_retry_permission_errors() {
    let ctx = TestContext::new().unwrap();
    let path = ctx.create_services(".desservices.ini", TWO_SECTIONS, 0o644).unwrap();
    let policy = RetryPolicy {
        attempts: 3,
        delay: Duration::from_secs(60),
    };

    let started = std::time::Instant::now();
    let err = CredentialStore::open_with_retry(&path, &policy).unwrap_err();

    assert!(matches!(err, ServiceAccessError::Permission { .. }));
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[test]
fn test_retry_gives_up_on_missing_file() {
    let ctx = TestContext::new().unwrap();
    let policy = RetryPolicy {
        attempts: 3,
        delay: Duration::from_millis(50),
    };

    let started = std::time::Instant::now();
    let err = CredentialStore::open_with_retry(ctx.path("blah"), &policy).unwrap_err();

    assert!(matches!(err, ServiceAccessError::Io { .. }));
    // Two pauses between three attempts.
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_retry_reads_file_that_appears_later() {
    use std::os::unix::fs::PermissionsExt;

    let ctx = TestContext::new().unwrap();
    let path = ctx.path("automounted.ini");
    let staging = ctx.path("staging.ini");
    let policy = RetryPolicy {
        attempts: 10,
        delay: Duration::from_millis(50),
    };

    let writer = {
        let path = path.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(75));
            // Written aside and renamed so the reader never sees a partial file.
            std::fs::write(&staging, TWO_SECTIONS).unwrap();
            std::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o640)).unwrap();
            std::fs::rename(&staging, &path).unwrap();
        })
    };

    let store = CredentialStore::open_with_retry(&path, &policy).unwrap();
    writer.join().unwrap();

    assert_eq!(store.section("file-http").unwrap().user(), Some("username"));
}

#[test]
fn test_fetch_from_home_with_section_from_environment() {
    let ctx = TestContext::new().unwrap();
    ctx.create_services(".desservices.ini", "\n[db-minimal]\nkey  =     akey\n", 0o640)
        .unwrap();

    let env = Environment::new(Some(ctx.temp_path.clone())).with_var("DES_DB_SECTION", "db-minimal");
    let creds = fetch(&Lookup::new().tag("DB"), &env, &RetryPolicy::none()).unwrap();

    assert_eq!(creds.get("key"), Some("akey"));
    assert_eq!(creds.render_template("%(meta_section)s").unwrap(), "db-minimal");
}

#[test]
fn test_fetch_section_from_environment_not_in_file() {
    let ctx = TestContext::new().unwrap();
    let path = ctx
        .create_services(".desservices.ini", "[db-minimal]\nkey = akey\n", 0o640)
        .unwrap();

    let env = Environment::new(None).with_var("DES_DB_SECTION", "some-non-existing section");
    let err = fetch(&Lookup::new().file(&path).tag("db"), &env, &RetryPolicy::none()).unwrap_err();

    assert!(matches!(err, ServiceAccessError::SectionNotFound { .. }));
}

#[test]
fn test_fetch_with_bad_home() {
    let env = Environment::new(Some("no/file/here".into()));
    let err = fetch(&Lookup::new().section("db-minimal"), &env, &RetryPolicy::none()).unwrap_err();

    assert!(matches!(err, ServiceAccessError::Io { .. }));
}
