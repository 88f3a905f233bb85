//! Incremental reconstruction of a learning guide streamed section by section.
//!
//! The server first announces the outline, then for each section emits a
//! `section.started`, any number of `section.chunk` fragments of the section's
//! JSON object, and a `section.completed`. Fragments are concatenated per
//! section and speculatively parsed (see [`crate::section_parse`]) so content
//! becomes visible while the section is still generating.

use events::{Event, EventType, SectionOutline};
use log::*;
use serde_json::Value;
use sse::error::missing_field;
use sse::{Error, EventRouter, Subscription};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::section_parse::{should_attempt_parse, try_parse_section, ParsedSection};

/// Materialized state of one section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionState {
    pub is_generating: bool,
    pub content: String,
    pub example: String,
    pub knowledge_check: Option<Value>,
}

impl SectionState {
    fn merge(&mut self, parsed: ParsedSection) {
        if let Some(content) = parsed.content {
            self.content = content;
        }
        if let Some(example) = parsed.example {
            self.example = example;
        }
        if let Some(knowledge_check) = parsed.knowledge_check {
            self.knowledge_check = Some(knowledge_check);
        }
    }
}

#[derive(Debug, Default)]
struct GuideState {
    outline: Vec<SectionOutline>,
    outline_ready: bool,
    sections: BTreeMap<usize, SectionState>,
    generating: BTreeSet<usize>,
    loaded: BTreeSet<usize>,
    /// Raw text per section; present only between started and completed.
    buffers: HashMap<usize, String>,
    complete: bool,
}

type OutlineCallback = Box<dyn Fn(&[SectionOutline]) + Send + Sync>;
type SectionCallback = Box<dyn Fn(usize, &SectionState) + Send + Sync>;
type CompleteCallback = Box<dyn Fn() + Send + Sync>;

struct Shared {
    content_id: String,
    state: Mutex<GuideState>,
    on_outline: Option<OutlineCallback>,
    on_section_loaded: Option<SectionCallback>,
    on_complete: Option<CompleteCallback>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, GuideState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_for_me(&self, event: &Event) -> bool {
        event.content_id.as_deref() == Some(self.content_id.as_str())
    }

    fn outline_completed(&self, event: &Event) -> Result<(), Error> {
        let outline = event
            .sections
            .clone()
            .ok_or_else(|| missing_field(&event.event_type, "sections"))?;

        {
            let mut state = self.lock();
            state.sections = (0..outline.len())
                .map(|index| (index, SectionState::default()))
                .collect();
            state.generating.clear();
            state.loaded.clear();
            state.buffers.clear();
            state.outline = outline.clone();
            state.outline_ready = true;
            state.complete = false;
        }

        info!(
            "Learning guide {} outlined with {} section(s)",
            self.content_id,
            outline.len()
        );
        if let Some(callback) = &self.on_outline {
            callback(&outline);
        }
        Ok(())
    }

    fn section_started(&self, event: &Event) -> Result<(), Error> {
        let index = section_index(event)?;

        let mut state = self.lock();
        state.generating.insert(index);
        state.buffers.insert(index, String::new());
        state.sections.entry(index).or_default().is_generating = true;

        debug!(
            "Section {} of {} started: {}",
            index,
            self.content_id,
            event.section_title.as_deref().unwrap_or("(untitled)")
        );
        Ok(())
    }

    fn section_chunk(&self, event: &Event) -> Result<(), Error> {
        let index = section_index(event)?;
        let chunk = event
            .chunk
            .as_deref()
            .ok_or_else(|| missing_field(&event.event_type, "chunk"))?;

        let mut state = self.lock();
        let Some(buffer) = state.buffers.get_mut(&index) else {
            warn!(
                "Dropping chunk for section {} of {}: section is not generating",
                index, self.content_id
            );
            return Ok(());
        };

        buffer.push_str(chunk);
        if !should_attempt_parse(buffer) {
            return Ok(());
        }

        match try_parse_section(buffer) {
            Some(parsed) => {
                trace!("Section {} of {} parsed", index, self.content_id);
                state.sections.entry(index).or_default().merge(parsed);
            }
            None => trace!(
                "Section {} of {} not parseable yet",
                index,
                self.content_id
            ),
        }
        Ok(())
    }

    fn section_completed(&self, event: &Event) -> Result<(), Error> {
        let index = section_index(event)?;

        let section = {
            let mut state = self.lock();
            state.generating.remove(&index);
            state.loaded.insert(index);
            state.buffers.remove(&index);
            let section = state.sections.entry(index).or_default();
            section.is_generating = false;
            section.clone()
        };

        debug!("Section {} of {} loaded", index, self.content_id);
        if let Some(callback) = &self.on_section_loaded {
            callback(index, &section);
        }
        Ok(())
    }

    fn all_sections_completed(&self, _event: &Event) -> Result<(), Error> {
        self.lock().complete = true;

        info!("Learning guide {} fully generated", self.content_id);
        if let Some(callback) = &self.on_complete {
            callback();
        }
        Ok(())
    }
}

fn section_index(event: &Event) -> Result<usize, Error> {
    event
        .section_index
        .ok_or_else(|| missing_field(&event.event_type, "sectionIndex"))
}

pub struct SectionStreamBuilder {
    content_id: String,
    on_outline: Option<OutlineCallback>,
    on_section_loaded: Option<SectionCallback>,
    on_complete: Option<CompleteCallback>,
}

impl SectionStreamBuilder {
    pub fn on_outline<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[SectionOutline]) + Send + Sync + 'static,
    {
        self.on_outline = Some(Box::new(callback));
        self
    }

    pub fn on_section_loaded<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, &SectionState) + Send + Sync + 'static,
    {
        self.on_section_loaded = Some(Box::new(callback));
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Subscribes to the five learning-guide event types.
    pub fn attach(self, router: &EventRouter) -> SectionStreamReconstructor {
        let shared = Arc::new(Shared {
            content_id: self.content_id,
            state: Mutex::new(GuideState::default()),
            on_outline: self.on_outline,
            on_section_loaded: self.on_section_loaded,
            on_complete: self.on_complete,
        });

        let subscriptions = vec![
            subscribe(router, &shared, EventType::OutlineCompleted, Shared::outline_completed),
            subscribe(router, &shared, EventType::SectionStarted, Shared::section_started),
            subscribe(router, &shared, EventType::SectionChunk, Shared::section_chunk),
            subscribe(router, &shared, EventType::SectionCompleted, Shared::section_completed),
            subscribe(
                router,
                &shared,
                EventType::AllSectionsCompleted,
                Shared::all_sections_completed,
            ),
        ];

        SectionStreamReconstructor {
            shared,
            subscriptions,
        }
    }
}

fn subscribe<F>(
    router: &EventRouter,
    shared: &Arc<Shared>,
    event_type: EventType,
    handle: F,
) -> Subscription
where
    F: Fn(&Shared, &Event) -> Result<(), Error> + Send + Sync + 'static,
{
    let shared = Arc::clone(shared);
    router.subscribe_fn(event_type, move |event: &Event| -> Result<(), Error> {
        // Several guides may stream at once over the same connection
        if !shared.is_for_me(event) {
            return Ok(());
        }
        handle(&shared, event)
    })
}

/// Rebuilds the sections of one learning guide from the event stream.
///
/// Only events whose `contentId` matches are considered. Unsubscribes and
/// drops any partial buffers on `teardown` or drop.
pub struct SectionStreamReconstructor {
    shared: Arc<Shared>,
    subscriptions: Vec<Subscription>,
}

impl SectionStreamReconstructor {
    pub fn builder(content_id: impl Into<String>) -> SectionStreamBuilder {
        SectionStreamBuilder {
            content_id: content_id.into(),
            on_outline: None,
            on_section_loaded: None,
            on_complete: None,
        }
    }

    pub fn content_id(&self) -> &str {
        &self.shared.content_id
    }

    pub fn is_outline_ready(&self) -> bool {
        self.shared.lock().outline_ready
    }

    pub fn outline(&self) -> Vec<SectionOutline> {
        self.shared.lock().outline.clone()
    }

    pub fn section(&self, index: usize) -> Option<SectionState> {
        self.shared.lock().sections.get(&index).cloned()
    }

    pub fn sections(&self) -> BTreeMap<usize, SectionState> {
        self.shared.lock().sections.clone()
    }

    pub fn generating_sections(&self) -> BTreeSet<usize> {
        self.shared.lock().generating.clone()
    }

    pub fn loaded_sections(&self) -> BTreeSet<usize> {
        self.shared.lock().loaded.clone()
    }

    /// Whether the server announced that every section has been generated.
    pub fn is_complete(&self) -> bool {
        self.shared.lock().complete
    }

    /// Unsubscribes from all learning-guide events and discards partial
    /// buffers. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        for subscription in &mut self.subscriptions {
            subscription.unsubscribe();
        }
        self.subscriptions.clear();
        self.shared.lock().buffers.clear();
    }

    #[cfg(test)]
    fn buffered_sections(&self) -> usize {
        self.shared.lock().buffers.len()
    }
}

impl Drop for SectionStreamReconstructor {
    fn drop(&mut self) {
        self.teardown();
    }
}
