//! Registration of the built-in module set.
//!
//! Discovery is the registry constructor: modules are compiled in, not
//! loaded from disk, so "scanning" is assembling the four built-ins with
//! their dependencies.

use std::sync::Arc;

use parcelwatch_model::ModuleKind;

use crate::analyzer::LlmAnalyzer;
use crate::analyzer::llm;
use crate::database::ports::modules::ModuleStore;
use crate::modules::{Module, ModuleManifest, ModuleRegistry, NoHooks};
use crate::notifier::WebhookNotifier;
use crate::notifier::webhook;
use crate::providers::{MailGlobalModule, MailUserModule, mail_global, mail_user};

/// Build the registry with every built-in module registered.
pub fn builtin_registry(
    store: Arc<dyn ModuleStore>,
    mail_user_module: Arc<MailUserModule>,
    mail_global_module: Arc<MailGlobalModule>,
    llm_analyzer: Arc<LlmAnalyzer>,
    webhook_notifier: Arc<WebhookNotifier>,
) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new(store);

    registry.register(Module::new(
        ModuleManifest {
            key: mail_user::MODULE_KEY,
            name: "Mail - User Mailboxes",
            kind: ModuleKind::Provider,
            version: "1.0.0",
            description: "Watch folders of user-connected IMAP mailboxes",
            enabled_by_default: true,
        },
        mail_user_module,
    ));

    registry.register(Module::new(
        ModuleManifest {
            key: mail_global::MODULE_KEY,
            name: "Mail - Global Mailbox",
            kind: ModuleKind::Provider,
            version: "1.0.0",
            description: "Watch a shared mailbox routed by sender address",
            enabled_by_default: false,
        },
        mail_global_module,
    ));

    registry.register(
        Module::new(
            ModuleManifest {
                key: llm::MODULE_KEY,
                name: "LLM Analyzer",
                kind: ModuleKind::Analyzer,
                version: "1.0.0",
                description: "Extract order data from captured mail via an LLM",
                enabled_by_default: true,
            },
            Arc::clone(&llm_analyzer) as Arc<dyn crate::modules::ModuleHooks>,
        )
        .with_analyzer(llm_analyzer),
    );

    registry.register(
        Module::new(
            ModuleManifest {
                key: webhook::MODULE_KEY,
                name: "Webhook Notifier",
                kind: ModuleKind::Notifier,
                version: "1.0.0",
                description: "Deliver order events to a per-user webhook URL",
                enabled_by_default: false,
            },
            Arc::new(NoHooks),
        )
        .with_notifier(webhook_notifier),
    );

    registry
}
