//! Ordered pre-store transforms run before every create and update.
//!
//! Hooks registered with [`HookMatcher::Always`] run first, in registration
//! order, followed by hooks whose content type matches the write's declared
//! `_type`, also in registration order. An [`HookError::Abort`] stops the
//! write; any other hook failure is logged and that hook is skipped.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{ContentReadApi, ContentResult, ContentWrite, FolioError, FolioResult, Subject};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("aborted: {0}")]
    Abort(String),
    #[error("failed: {0}")]
    Failed(String),
}

impl HookError {
    pub fn abort(message: impl Into<String>) -> Self {
        Self::Abort(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

pub type HookResult<T> = Result<T, HookError>;

/// Read access to stored content and the acting subject.
pub struct HookContext<'a> {
    reader: &'a dyn ContentReadApi,
    subject: &'a Subject,
}

impl<'a> HookContext<'a> {
    pub fn new(reader: &'a dyn ContentReadApi, subject: &'a Subject) -> Self {
        Self { reader, subject }
    }

    pub fn reader(&self) -> &'a dyn ContentReadApi {
        self.reader
    }

    pub fn subject(&self) -> &'a Subject {
        self.subject
    }
}

#[async_trait]
pub trait PreStoreHook: Send + Sync {
    fn name(&self) -> &str;

    /// `existing` is the current latest content on update and `None` on create.
    async fn pre_store(
        &self,
        write: ContentWrite,
        existing: Option<&ContentResult>,
        ctx: &HookContext<'_>,
    ) -> HookResult<ContentWrite>;
}

/// Adapts a synchronous closure into a [`PreStoreHook`].
pub struct FnHook<F> {
    name: String,
    func: F,
}

impl<F> FnHook<F>
where
    F: Fn(ContentWrite, Option<&ContentResult>, &Subject) -> HookResult<ContentWrite> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> PreStoreHook for FnHook<F>
where
    F: Fn(ContentWrite, Option<&ContentResult>, &Subject) -> HookResult<ContentWrite> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn pre_store(
        &self,
        write: ContentWrite,
        existing: Option<&ContentResult>,
        ctx: &HookContext<'_>,
    ) -> HookResult<ContentWrite> {
        (self.func)(write, existing, ctx.subject())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HookMatcher {
    Always,
    ContentType(String),
}

impl HookMatcher {
    pub fn content_type(name: impl Into<String>) -> Self {
        Self::ContentType(name.into())
    }
}

#[derive(Clone, Default)]
pub struct HookPipeline {
    entries: Vec<(HookMatcher, Arc<dyn PreStoreHook>)>,
}

impl fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|(matcher, hook)| (matcher, hook.name())),
            )
            .finish()
    }
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, matcher: HookMatcher, hook: Arc<dyn PreStoreHook>) {
        self.entries.push((matcher, hook));
    }

    pub fn register_all(&mut self, hook: Arc<dyn PreStoreHook>) {
        self.register(HookMatcher::Always, hook);
    }

    pub fn register_for(&mut self, content_type: impl Into<String>, hook: Arc<dyn PreStoreHook>) {
        self.register(HookMatcher::content_type(content_type), hook);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chain_for(&self, content_type: Option<&str>) -> Vec<Arc<dyn PreStoreHook>> {
        let wildcard = self
            .entries
            .iter()
            .filter(|(matcher, _)| *matcher == HookMatcher::Always);
        let typed = self.entries.iter().filter(|(matcher, _)| match matcher {
            HookMatcher::ContentType(name) => Some(name.as_str()) == content_type,
            HookMatcher::Always => false,
        });
        wildcard
            .chain(typed)
            .map(|(_, hook)| Arc::clone(hook))
            .collect()
    }

    pub async fn run(
        &self,
        write: ContentWrite,
        existing: Option<&ContentResult>,
        ctx: &HookContext<'_>,
    ) -> FolioResult<ContentWrite> {
        let chain = self.chain_for(write.declared_type());
        let mut current = write;
        for hook in chain {
            match hook.pre_store(current.clone(), existing, ctx).await {
                Ok(next) => current = next,
                Err(HookError::Abort(message)) => {
                    return Err(FolioError::hook_aborted(hook.name(), message));
                }
                Err(HookError::Failed(message)) => {
                    log::warn!("pre-store hook '{}' failed, skipping: {message}", hook.name());
                }
            }
        }
        Ok(current)
    }
}
