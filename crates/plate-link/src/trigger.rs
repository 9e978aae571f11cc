//! Asks a collaborator which element to link to, then links the selection.

use std::cell::RefCell;
use std::rc::Rc;

use futures_util::FutureExt;
use futures_util::future::{self, LocalBoxFuture};
use plate_core::{CommandError, Editor};
use serde::{Deserialize, Serialize};

use crate::LINK_COMMAND;
use crate::commands::LinkArgs;

/// A document element picked as a link target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTarget {
    pub id: String,
    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl LinkTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Resolves a link target, typically through UI. `None` means the user
/// aborted.
pub trait TargetSelector {
    fn select(&self) -> LocalBoxFuture<'static, Option<LinkTarget>>;
}

/// Adapts a synchronous callback.
pub struct SyncSelector<F>(F);

impl<F> SyncSelector<F>
where
    F: Fn() -> Option<LinkTarget>,
{
    pub fn new(select: F) -> Self {
        Self(select)
    }
}

impl<F> TargetSelector for SyncSelector<F>
where
    F: Fn() -> Option<LinkTarget>,
{
    fn select(&self) -> LocalBoxFuture<'static, Option<LinkTarget>> {
        future::ready((self.0)()).boxed_local()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Linked(LinkTarget),
    Aborted,
    NoSelector,
}

pub struct LinkTrigger {
    selector: Option<Rc<dyn TargetSelector>>,
}

impl LinkTrigger {
    pub fn new(selector: Option<Rc<dyn TargetSelector>>) -> Self {
        if selector.is_none() {
            log::warn!("no link target selector configured; link trigger is disabled");
        }
        Self { selector }
    }

    pub fn is_available(&self) -> bool {
        self.selector.is_some()
    }

    /// Waits for a target, then runs the link command as its own batch. The
    /// editor is only borrowed once the target is known.
    pub async fn execute(&self, editor: &RefCell<Editor>) -> Result<TriggerOutcome, CommandError> {
        let Some(selector) = self.selector.clone() else {
            return Ok(TriggerOutcome::NoSelector);
        };
        let Some(target) = selector.select().await else {
            log::debug!("link target selection aborted");
            return Ok(TriggerOutcome::Aborted);
        };

        let mut args = LinkArgs::new(target.id.as_str());
        if let Some(label) = &target.label {
            args = args.label(label.as_str());
        }
        let args =
            serde_json::to_value(args).map_err(|err| CommandError::InvalidArgs(err.to_string()))?;
        editor.borrow_mut().run_command(LINK_COMMAND, Some(args))?;
        Ok(TriggerOutcome::Linked(target))
    }
}
