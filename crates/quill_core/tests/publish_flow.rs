//! End-to-end tests of the public API: draft, autosave, publish, edit,
//! archive and author change against an in-process ledger.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_lite::future::block_on;
use quill_core::patch::apply_patch;
use quill_core::{
    AutosaveOutcome, BoxFuture, Capability, CommentTx, EditorData, IdentityService,
    IdentityStatus, IdentitySummary, PostKey, PostStatus, PublishOutcome, PublishState, Quill,
    QuillConfig, QuillError, RemoteContent, RemoteLedgerClient, SaveDraftResult, SwitchStatus,
    TxReceipt,
};

#[derive(Default)]
struct Chain {
    contents: Mutex<HashMap<(String, String), RemoteContent>>,
    txs: Mutex<Vec<CommentTx>>,
}

impl Chain {
    fn archive(&self, author: &str, permlink: &str) {
        let mut contents = self.contents.lock().unwrap();
        if let Some(content) = contents.get_mut(&(author.to_string(), permlink.to_string())) {
            content.archived = true;
        }
    }
}

impl RemoteLedgerClient for Chain {
    fn get_content<'a>(
        &'a self,
        author: &'a str,
        permlink: &'a str,
    ) -> BoxFuture<'a, quill_core::Result<Option<RemoteContent>>> {
        Box::pin(async move {
            Ok(self
                .contents
                .lock()
                .unwrap()
                .get(&(author.to_string(), permlink.to_string()))
                .cloned())
        })
    }

    fn submit<'a>(&'a self, tx: &'a CommentTx) -> BoxFuture<'a, quill_core::Result<TxReceipt>> {
        Box::pin(async move {
            let mut contents = self.contents.lock().unwrap();
            let key = (tx.author.clone(), tx.permlink.clone());
            let body = match contents.get(&key) {
                Some(previous) => apply_patch(&previous.body, &tx.body)?,
                None => tx.body.clone(),
            };
            contents.insert(
                key,
                RemoteContent {
                    title: tx.title.clone(),
                    body,
                    json_metadata: tx.json_metadata.clone(),
                    parent_permlink: tx.parent_permlink.clone(),
                    archived: false,
                },
            );
            let mut txs = self.txs.lock().unwrap();
            txs.push(tx.clone());
            Ok(TxReceipt {
                tx_id: format!("{:08x}", txs.len()),
                block_num: None,
            })
        })
    }
}

struct Vault {
    accounts: Vec<String>,
    active: Mutex<String>,
}

impl IdentityService for Vault {
    fn use_identity<'a>(
        &'a self,
        author: &'a str,
        required: &'a [Capability],
    ) -> BoxFuture<'a, quill_core::Result<IdentityStatus>> {
        Box::pin(async move {
            if !self.accounts.iter().any(|a| a == author) {
                return Ok(IdentityStatus::NotFound);
            }
            if required.contains(&Capability::Active) {
                return Ok(IdentityStatus::MissingKey);
            }
            *self.active.lock().unwrap() = author.to_string();
            Ok(IdentityStatus::Good)
        })
    }

    fn switch_identity<'a>(&'a self, author: &'a str) -> BoxFuture<'a, quill_core::Result<SwitchStatus>> {
        Box::pin(async move {
            if self.accounts.iter().any(|a| a == author) {
                *self.active.lock().unwrap() = author.to_string();
                Ok(SwitchStatus::Switched)
            } else {
                Ok(SwitchStatus::NotSwitched)
            }
        })
    }

    fn summary(&self) -> BoxFuture<'_, quill_core::Result<IdentitySummary>> {
        Box::pin(async move {
            Ok(IdentitySummary {
                accounts: self.accounts.clone(),
                active: self.active.lock().unwrap().clone(),
                is_encrypted: true,
                is_unlocked: true,
            })
        })
    }
}

fn setup(config: QuillConfig) -> (Arc<Chain>, Quill) {
    let chain = Arc::new(Chain::default());
    let vault = Arc::new(Vault {
        accounts: vec!["alice".to_string(), "bob".to_string()],
        active: Mutex::new("alice".to_string()),
    });
    let quill = Quill::builder(chain.clone(), vault)
        .config(config)
        .build()
        .unwrap();
    (chain, quill)
}

fn editor(permlink: &str, body: &str) -> EditorData {
    EditorData {
        author: "alice".to_string(),
        permlink: permlink.to_string(),
        title: "My First Post!!".to_string(),
        body: body.to_string(),
        tags: "intro life".to_string(),
        additional_json: r#"{"app":"quill/0.1"}"#.to_string(),
    }
}

#[test]
fn draft_publish_edit_archive() {
    let (chain, quill) = setup(QuillConfig::default());

    let permlink = block_on(quill.generate_permlink("alice", "My First Post!!")).unwrap();
    assert_eq!(permlink, "my-first-post");
    let key = PostKey::new("alice", &permlink);

    // Autosave, then an explicit draft that supersedes it.
    let autosaved = quill.autosave(&editor(&permlink, "Hello"));
    assert!(matches!(autosaved, AutosaveOutcome::Saved { .. }));
    assert!(quill.revision_info(&key).unwrap().has_autosave());

    let saved = block_on(quill.save_draft(&editor(&permlink, "Hello, chain.\n"))).unwrap();
    assert!(saved.was_saved());
    assert!(!quill.revision_info(&key).unwrap().has_autosave());
    assert!(matches!(
        block_on(quill.save_draft(&editor(&permlink, "Hello, chain.\n"))).unwrap(),
        SaveDraftResult::AlreadySaved { .. }
    ));

    // First publish sends the full body under the first tag.
    let outcome = block_on(quill.publish(&editor(&permlink, "Hello, chain.\n"))).unwrap();
    assert!(outcome.was_published());
    {
        let txs = chain.txs.lock().unwrap();
        assert_eq!(txs[0].parent_permlink, "intro");
        assert_eq!(txs[0].body, "Hello, chain.\n");
        assert!(txs[0].json_metadata.contains("\"app\":\"quill/0.1\""));
    }
    assert_eq!(
        quill.load_post(&key).unwrap().unwrap().post.status,
        PostStatus::Published
    );

    // Same content again is a no-op.
    let again = block_on(quill.publish(&editor(&permlink, "Hello, chain.\n"))).unwrap();
    assert!(matches!(again, PublishOutcome::AlreadyPublished { .. }));

    // An edit goes out as a patch that rebuilds the new body on chain.
    let edited = "Hello, chain.\nSecond paragraph.\n";
    block_on(quill.publish(&editor(&permlink, edited))).unwrap();
    {
        let txs = chain.txs.lock().unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[1].parent_permlink, "intro");
        assert_ne!(txs[1].body, edited);
    }
    let remote = block_on(quill.remote_content("alice", &permlink)).unwrap().unwrap();
    assert_eq!(remote.body, edited);

    // Once archived, nothing can be published and nothing is written.
    chain.archive("alice", &permlink);
    let history = quill.history(&key).unwrap().len();
    let mut pipeline = quill.publish_pipeline();
    let err = block_on(pipeline.run(&editor(&permlink, "Too late\n"), 0)).unwrap_err();
    assert!(matches!(err, QuillError::Archived(_)));
    assert_eq!(pipeline.state(), PublishState::Failed);
    assert_eq!(quill.history(&key).unwrap().len(), history);
    assert_eq!(chain.txs.lock().unwrap().len(), 2);

    assert_eq!(
        block_on(quill.refresh_remote_status(&key)).unwrap(),
        PostStatus::Archived
    );
    assert!(!quill.locks().is_locked(&key));
}

#[test]
fn author_change_moves_history() {
    let (_chain, quill) = setup(QuillConfig::default());
    let key = PostKey::new("alice", "draft-post");

    block_on(quill.save_draft(&editor("draft-post", "v1"))).unwrap();
    block_on(quill.save_draft(&editor("draft-post", "v2"))).unwrap();

    let outcome = block_on(quill.change_author(&key, "bob")).unwrap();
    assert!(!outcome.go_home);
    assert_eq!(outcome.identity.as_ref().unwrap().active, "bob");
    assert_eq!(outcome.new_key.author, "bob");

    assert!(quill.load_post(&key).unwrap().is_none());
    let moved = quill.load_post(&outcome.new_key).unwrap().unwrap();
    assert_eq!(moved.revision.body, "v2");
    assert_eq!(quill.history(&outcome.new_key).unwrap().len(), 2);

    let listing = quill.list_posts("bob", None, 10, 0).unwrap();
    assert_eq!(listing.total, 1);
    assert_eq!(quill.list_posts("alice", None, 10, 0).unwrap().total, 0);
}

#[test]
fn unknown_author_cannot_publish() {
    let (chain, quill) = setup(QuillConfig::default());
    let mut stranger = editor("hello", "Body");
    stranger.author = "mallory".to_string();

    let err = block_on(quill.publish(&stranger)).unwrap_err();
    assert!(matches!(err, QuillError::Unauthorized { .. }));
    assert!(chain.txs.lock().unwrap().is_empty());
    assert!(quill.load_post(&stranger.key()).unwrap().is_none());
}

#[cfg(feature = "sqlite")]
#[test]
fn history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = QuillConfig::with_database(dir.path().join("posts.db"));
    let key = PostKey::new("alice", "persisted");

    {
        let (_chain, quill) = setup(config.clone());
        block_on(quill.save_draft(&editor("persisted", "Saved body"))).unwrap();
        quill.autosave(&editor("persisted", "Saved body, then more"));
    }

    let (_chain, quill) = setup(config);
    let loaded = quill.load_post(&key).unwrap().unwrap();
    assert!(loaded.from_autosave());
    assert_eq!(loaded.revision.body, "Saved body, then more");
    assert_eq!(quill.history(&key).unwrap().len(), 2);
}
