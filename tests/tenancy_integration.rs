//! End-to-end flows across the master directory, provisioning, tenant stores,
//! and admin reporting, on real libSQL files in a temp directory.

use std::sync::Arc;

use chrono::Duration;
use pretty_assertions::assert_eq;

use clausease::auth::{MasterDirectory, ResetDelivery};
use clausease::config::AuthConfig;
use clausease::db::libsql::{MasterStore, TenantStore};
use clausease::db::{
    AccountStore, ChatStore, ChatTurn, DocumentStore, GlossaryStore, GlossaryTermParams,
    LegalFlag, NewDocumentParams, SimplificationLevel, TenantUserStore,
};
use clausease::error::DirectoryError;
use clausease::legal::GlossaryMerger;
use clausease::reporting::AdminReports;
use clausease::tenancy::{Provisioner, TenantLocator};

const PASSWORD: &str = "Str0ng!pass";

struct Harness {
    master: Arc<MasterStore>,
    directory: MasterDirectory,
    provisioner: Provisioner,
    reports: AdminReports,
    _tmpdir: tempfile::TempDir,
}

async fn harness_with(auth: AuthConfig) -> Harness {
    let tmpdir = tempfile::tempdir().expect("tempdir");
    let master = Arc::new(
        MasterStore::open(&tmpdir.path().join("master.db"))
            .await
            .expect("master store"),
    );
    let locator = TenantLocator::new(tmpdir.path().join("tenants"));
    Harness {
        directory: MasterDirectory::new(master.clone(), &auth),
        provisioner: Provisioner::new(locator.clone(), master.clone()),
        reports: AdminReports::new(master.clone(), locator),
        master,
        _tmpdir: tmpdir,
    }
}

async fn harness() -> Harness {
    harness_with(AuthConfig::default()).await
}

fn document(user_id: i64, original_words: i64, simplified_words: i64) -> NewDocumentParams {
    NewDocumentParams {
        user_id,
        original_file_name: Some("lease.pdf".to_string()),
        title: "Lease".to_string(),
        original_text: "The tenant shall pay rent.".to_string(),
        simplified_text: "Pay rent.".to_string(),
        simplification_level: SimplificationLevel::Basic,
        is_legal: LegalFlag::Unknown,
        original_word_count: original_words,
        simplified_word_count: simplified_words,
    }
}

#[tokio::test]
async fn register_provision_save_and_report() {
    let h = harness().await;

    let account = h.directory.register("a@x.com", PASSWORD).await.expect("register");
    assert_eq!(account.account_id, 1);
    assert!(!account.is_admin);
    assert!(account.tenant_mapped);

    let path = h
        .provisioner
        .ensure_tenant_store(&account.email, account.account_id)
        .await
        .expect("provision");
    let store = TenantStore::open(&path).await.expect("open tenant store");
    assert_eq!(store.count_users().await.expect("users"), 1);
    assert_eq!(store.list_glossary().await.expect("glossary").len(), 4);

    let user_id = store
        .get_user_id("a@x.com")
        .await
        .expect("lookup")
        .expect("tenant user");
    store
        .save_document(&document(user_id, 100, 40))
        .await
        .expect("save document");

    let docs = store.list_documents().await.expect("documents");
    assert_eq!(docs.len(), 1);
    assert_eq!(
        (docs[0].original_word_count, docs[0].simplified_word_count),
        (100, 40)
    );

    let across = h.reports.all_documents().await.expect("all documents");
    assert_eq!(across.len(), 1);
    assert_eq!(across[0].tenant_email, "a@x.com");

    let err = h
        .directory
        .request_reset("b@x.com")
        .await
        .expect_err("unregistered");
    assert!(matches!(err, DirectoryError::NotFound(_)));
}

#[tokio::test]
async fn duplicate_registration_creates_one_account() {
    let h = harness().await;
    h.directory.register("a@x.com", PASSWORD).await.expect("first");
    let err = h
        .directory
        .register("a@x.com", PASSWORD)
        .await
        .expect_err("second");
    assert!(matches!(err, DirectoryError::AlreadyRegistered(_)));
    assert_eq!(h.master.list_accounts().await.expect("accounts").len(), 1);
}

#[tokio::test]
async fn admin_tag_is_stripped_and_gets_no_tenant() {
    let h = harness().await;
    let admin = h
        .directory
        .register("boss+admin@x.com", PASSWORD)
        .await
        .expect("register admin");
    assert_eq!(admin.email, "boss@x.com");
    assert!(admin.is_admin);

    assert!(h.master.list_tenant_mappings().await.expect("mappings").is_empty());
    assert!(h.reports.list_tenant_emails().await.expect("tenants").is_empty());

    // Same identity without the tag.
    assert!(matches!(
        h.directory.register("boss@x.com", PASSWORD).await,
        Err(DirectoryError::AlreadyRegistered(_))
    ));
}

#[tokio::test]
async fn expired_reset_token_is_cleared_and_credential_kept() {
    let h = harness_with(AuthConfig {
        reset_token_ttl: Duration::seconds(-1),
        ..AuthConfig::default()
    })
    .await;
    h.directory.register("a@x.com", PASSWORD).await.expect("register");

    let ResetDelivery::Surfaced(token) = h.directory.request_reset("a@x.com").await.expect("reset")
    else {
        panic!("no mailer configured, token should be surfaced");
    };

    let first = h
        .directory
        .reset_with_token("a@x.com", &token, "N3w!password")
        .await
        .expect_err("expired");
    assert!(matches!(first, DirectoryError::ExpiredResetToken));

    let second = h
        .directory
        .reset_with_token("a@x.com", &token, "N3w!password")
        .await
        .expect_err("cleared");
    assert!(matches!(second, DirectoryError::InvalidResetToken));
    assert!(first.is_invalid_or_expired_token() && second.is_invalid_or_expired_token());

    h.directory
        .authenticate("a@x.com", PASSWORD)
        .await
        .expect("old credential still works");
}

#[tokio::test]
async fn reset_then_login_with_new_credential() {
    let h = harness().await;
    h.directory.register("a@x.com", PASSWORD).await.expect("register");
    let ResetDelivery::Surfaced(token) = h.directory.request_reset("a@x.com").await.expect("reset")
    else {
        panic!("token should be surfaced");
    };
    h.directory
        .reset_with_token("a@x.com", &token, "N3w!password")
        .await
        .expect("reset");

    assert!(matches!(
        h.directory.authenticate("a@x.com", PASSWORD).await,
        Err(DirectoryError::InvalidCredentials)
    ));
    h.directory
        .authenticate("a@x.com", "N3w!password")
        .await
        .expect("new credential");
}

#[tokio::test]
async fn glossary_is_case_insensitive_and_learns_from_text() {
    let h = harness().await;
    let account = h.directory.register("a@x.com", PASSWORD).await.expect("register");
    let store = h
        .provisioner
        .ensure_and_open(&account.email, account.account_id)
        .await
        .expect("provision");

    for term in ["Liability", "liability"] {
        store
            .upsert_glossary_term(&GlossaryTermParams {
                term: term.to_string(),
                definition: "legal responsibility".to_string(),
                category: None,
            })
            .await
            .expect("upsert");
    }
    let liability: Vec<_> = store
        .list_glossary()
        .await
        .expect("glossary")
        .into_iter()
        .filter(|e| e.term.eq_ignore_ascii_case("liability"))
        .collect();
    assert_eq!(liability.len(), 1);
    assert_eq!(liability[0].term, "liability");

    let report = GlossaryMerger::update_from_text(
        &store,
        "If either party commits a breach, damages apply. Breach means failing to perform.",
        "",
    )
    .await;
    assert!(report.is_clean());
    let breach = store
        .get_glossary_term("breach")
        .await
        .expect("get")
        .expect("breach");
    assert_eq!(breach.definition, "failing to perform");
}

#[tokio::test]
async fn chat_save_replaces_the_transcript() {
    let h = harness().await;
    let account = h.directory.register("a@x.com", PASSWORD).await.expect("register");
    let store = h
        .provisioner
        .ensure_and_open(&account.email, account.account_id)
        .await
        .expect("provision");
    let user_id = store
        .get_user_id("a@x.com")
        .await
        .expect("lookup")
        .expect("user");
    let doc = store
        .save_document(&document(user_id, 5, 2))
        .await
        .expect("save");

    store
        .save_chat(doc, user_id, &[ChatTurn::user("hi"), ChatTurn::assistant("hello")])
        .await
        .expect("first");
    store
        .save_chat(doc, user_id, &[ChatTurn::user("what is a lease?")])
        .await
        .expect("second");

    assert_eq!(
        store.load_chat(doc, user_id).await.expect("load"),
        vec![ChatTurn::user("what is a lease?")]
    );
}
