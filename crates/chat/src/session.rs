use std::sync::Arc;

use tokio::sync::watch;
use wetalk_directory::{ContactDirectory, UserId};
use wetalk_transport::{Transport, TransportEventStream};

use crate::composer::{ComposeError, ComposeResult, DraftComposer};
use crate::projection::{ProjectedMessage, ScrollCue, project_messages};
use crate::reconciler::{LinkStatus, Reconciler, ReconcilerHandle};
use crate::settings::ClientSettings;
use crate::store::ConversationStore;

/// Presentation snapshot for the selected conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub peer: UserId,
    pub items: Vec<ProjectedMessage>,
    /// True exactly once per identity-or-tail change of the projected list.
    pub scroll_to_latest: bool,
}

/// Coordinator wiring the store, reconciler, send pipeline, and projection
/// into the surface a host application consumes.
pub struct ChatSession {
    store: ConversationStore,
    directory: Arc<dyn ContactDirectory>,
    transport: Arc<dyn Transport>,
    local_user: UserId,
    local_echo: bool,
    composer: Option<DraftComposer>,
    scroll: ScrollCue,
    reconciler: Option<ReconcilerHandle>,
}

impl ChatSession {
    pub fn new(
        directory: Arc<dyn ContactDirectory>,
        transport: Arc<dyn Transport>,
        local_user: UserId,
        settings: &ClientSettings,
    ) -> Self {
        Self {
            store: ConversationStore::new(),
            directory,
            transport,
            local_user,
            local_echo: settings.local_echo,
            composer: None,
            scroll: ScrollCue::new(),
            reconciler: None,
        }
    }

    /// Handle to the shared conversation state, e.g. for extra observers.
    pub fn store(&self) -> ConversationStore {
        self.store.clone()
    }

    pub fn local_user(&self) -> UserId {
        self.local_user
    }

    /// Attaches the transport's inbound stream and starts reconciling.
    ///
    /// A previously running reconciler is stopped on drop of its handle.
    pub fn start(&mut self, events: TransportEventStream) {
        let reconciler = Reconciler::new(self.store.clone(), self.local_user);
        self.reconciler = Some(reconciler.start(events));
    }

    /// Stops reconciling and waits until no further event can reach the
    /// store. The projection keeps working on whatever was received.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.reconciler.take() {
            handle.stop().await;
        }
        self.scroll.reset();
    }

    /// Link status watch, available while the reconciler runs.
    pub fn link_status(&self) -> Option<watch::Receiver<LinkStatus>> {
        self.reconciler
            .as_ref()
            .map(ReconcilerHandle::link_status)
    }

    /// Binds the outbound pipeline to a newly routed conversation.
    ///
    /// Reselecting the current peer keeps the draft; switching peers starts
    /// from an empty one.
    pub fn select_peer(&mut self, peer: UserId) {
        if self
            .composer
            .as_ref()
            .is_some_and(|composer| composer.peer() == peer)
        {
            return;
        }

        self.composer = Some(
            DraftComposer::new(
                Arc::clone(&self.transport),
                self.store.clone(),
                self.local_user,
                peer,
            )
            .with_local_echo(self.local_echo),
        );
    }

    pub fn selected_peer(&self) -> Option<UserId> {
        self.composer.as_ref().map(DraftComposer::peer)
    }

    pub fn draft(&self) -> &str {
        self.composer
            .as_ref()
            .map(DraftComposer::draft)
            .unwrap_or_default()
    }

    pub fn set_draft(&mut self, content: impl Into<String>) {
        if let Some(composer) = self.composer.as_mut() {
            composer.set_draft(content);
        }
    }

    pub fn validation_error(&self) -> Option<&ComposeError> {
        self.composer
            .as_ref()
            .and_then(DraftComposer::validation_error)
    }

    /// Submits the current draft to the selected peer.
    pub fn submit(&mut self) -> ComposeResult<()> {
        match self.composer.as_mut() {
            Some(composer) => composer.submit(),
            None => Err(ComposeError::NoPeerSelected),
        }
    }

    /// Projects the selected conversation for rendering.
    ///
    /// `None` until a peer is selected. Recompute on every store update
    /// notification; the scroll cue embedded in the snapshot already
    /// deduplicates.
    pub fn view(&mut self) -> Option<ConversationSnapshot> {
        let peer = self.composer.as_ref()?.peer();
        let messages = self.store.get(peer);
        let items = project_messages(&messages, self.directory.as_ref());
        let scroll_to_latest = self.scroll.observe(peer, &messages);

        Some(ConversationSnapshot {
            peer,
            items,
            scroll_to_latest,
        })
    }
}
