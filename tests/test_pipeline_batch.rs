//! Batch pipeline integration tests
//!
//! Runs the pipeline over real directory trees and checks isolation of
//! failures, cross-file reference resolution and deterministic ordering.

use std::fs;
use tempfile::TempDir;
use xlang_canon::core::canonical::CanonicalType;
use xlang_canon::{BatchPipeline, Config, ErrorCategory, PatternTag};

const CRM_IR: &str = r#"[
  {"kind": "entity", "name": "Account", "source_format": "python",
   "fields": [
     {"name": "name", "field_type": "text"},
     {"name": "created_at", "field_type": "timestamp"},
     {"name": "updated_at", "field_type": "timestamp"}
   ]},
  {"kind": "entity", "name": "Lead", "source_format": "python",
   "fields": [
     {"name": "email", "field_type": "text"},
     {"name": "owner", "field_type": "unknown_type"}
   ]},
  {"kind": "entity", "name": "Opportunity", "source_format": "python",
   "fields": [
     {"name": "amount", "field_type": "decimal"},
     {"name": "account", "field_type": "reference", "reference": "Account"}
   ]}
]"#;

fn crm_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("ir")).unwrap();
    fs::create_dir_all(root.join("models")).unwrap();
    fs::create_dir_all(root.join("tests")).unwrap();
    fs::write(root.join("ir/crm.ir.json"), CRM_IR).unwrap();
    fs::write(
        root.join("models/contact.py"),
        r#"
class Contact(Base):
    __tablename__ = "contacts"
    email = Column(String(255), nullable=False)
    account_id = Column(Integer, ForeignKey("accounts.id"))
    status = Column(String(20), default="lead")

    def qualify(self):
        if self.status != "lead":
            return False
        self.status = "qualified"
"#,
    )
    .unwrap();
    fs::write(
        root.join("tests/test_contact.py"),
        r#"
def test_qualify_contact():
    contact = Contact(status="lead")
    contact.qualify()
    assert contact.status == "qualified"
"#,
    )
    .unwrap();
    dir
}

#[test]
fn test_unresolved_type_fails_only_its_entity() {
    let dir = crm_tree();
    let result = BatchPipeline::default().run_paths(&[dir.path()]);

    let lead_errors: Vec<_> = result
        .errors
        .iter()
        .filter(|e| e.entity.as_deref() == Some("Lead"))
        .collect();
    assert_eq!(lead_errors.len(), 1, "{:?}", result.errors);
    assert_eq!(lead_errors[0].category, ErrorCategory::Mapping);
    assert!(lead_errors[0].message.contains("unknown_type"));
    assert!(lead_errors[0].path.ends_with("ir/crm.ir.json"));

    assert!(result.entity("Lead").is_none());
    for name in ["Account", "Opportunity", "Contact"] {
        assert!(result.entity(name).is_some(), "missing {}", name);
    }
    assert_eq!(result.tests.len(), 1);
    assert_eq!(result.summary.succeeded, 4);
    assert_eq!(result.summary.failed.get(&ErrorCategory::Mapping), Some(&1));
}

#[test]
fn test_references_resolve_across_files() {
    let dir = crm_tree();
    let result = BatchPipeline::default().run_paths(&[dir.path()]);

    let contact = result.entity("Contact").unwrap();
    let account_id = contact.field("account_id").unwrap();
    assert_eq!(account_id.reference.as_deref(), Some("Account"));
    assert!(account_id.field_type.is_nullable());
    assert_eq!(account_id.field_type.base(), &CanonicalType::Reference);

    let opportunity = result.entity("Opportunity").unwrap();
    assert_eq!(opportunity.field("account").unwrap().reference.as_deref(), Some("Account"));
}

#[test]
fn test_guard_and_usage_survive_the_batch() {
    let dir = crm_tree();
    let result = BatchPipeline::default().run_paths(&[dir.path()]);

    let qualify = result.entity("Contact").unwrap().action("qualify").unwrap();
    let json = serde_json::to_string(&qualify.steps).unwrap();
    assert!(json.contains(r#"status == \"lead\""#), "{}", json);

    assert_eq!(result.usage.count(PatternTag::AuditTriad), 1);
    assert_eq!(result.usage.entities(PatternTag::AuditTriad).len(), 1);
}

#[test]
fn test_batches_are_deterministic() {
    let dir = crm_tree();
    let single = BatchPipeline::new(Config { workers: 1, ..Config::default() }).run_paths(&[dir.path()]);
    let many = BatchPipeline::new(Config { workers: 8, ..Config::default() }).run_paths(&[dir.path()]);

    let names = |r: &xlang_canon::BatchResult| -> Vec<String> {
        r.entities.iter().map(|s| s.entity().to_string()).collect()
    };
    assert_eq!(names(&single), names(&many));
    assert_eq!(
        single.entities.iter().map(|s| s.fingerprint()).collect::<Vec<_>>(),
        many.entities.iter().map(|s| s.fingerprint()).collect::<Vec<_>>()
    );
    assert_eq!(single.errors, many.errors);
}

#[test]
fn test_exclude_globs_apply() {
    let dir = crm_tree();
    let config = Config {
        exclude: vec!["tests".to_string()],
        ..Config::default()
    };
    let result = BatchPipeline::new(config).run_paths(&[dir.path()]);
    assert!(result.tests.is_empty());
    assert_eq!(result.entities.len(), 3);
    assert_eq!(result.summary.files, 2);
}

#[test]
fn test_cancellation_before_start() {
    let dir = crm_tree();
    let pipeline = BatchPipeline::default();
    pipeline.cancellation_token().cancel();
    let result = pipeline.run_paths(&[dir.path()]);
    assert!(result.cancelled);
    assert!(result.entities.is_empty());
    assert_eq!(result.summary.skipped, result.summary.files);
}

#[test]
fn test_missing_root_is_recorded() {
    let dir = crm_tree();
    let missing = dir.path().join("nope");
    let result = BatchPipeline::default().run_paths(&[dir.path().to_path_buf(), missing]);
    assert_eq!(result.errors[0].category, ErrorCategory::Io);
    assert!(result.entity("Contact").is_some());
}
