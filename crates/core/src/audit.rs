use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::request::ServiceRequestId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Request,
    Flow,
    Offer,
    Order,
    Persistence,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub service_request_id: Option<ServiceRequestId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        service_request_id: Option<ServiceRequestId>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { service_request_id, correlation_id: correlation_id.into(), actor: actor.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub service_request_id: Option<ServiceRequestId>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        service_request_id: Option<ServiceRequestId>,
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            service_request_id,
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn from_context(
        context: &AuditContext,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self::new(
            context.service_request_id.clone(),
            context.correlation_id.clone(),
            event_type,
            category,
            context.actor.clone(),
            outcome,
        )
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Forwards audit events to the `tracing` pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let service_request_id =
            event.service_request_id.as_ref().map(ToString::to_string).unwrap_or_default();
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        match event.outcome {
            AuditOutcome::Success => tracing::info!(
                event_name = "audit.event",
                audit_event_type = %event.event_type,
                category = ?event.category,
                correlation_id = %event.correlation_id,
                service_request_id = %service_request_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit event recorded"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => tracing::warn!(
                event_name = "audit.event",
                audit_event_type = %event.event_type,
                category = ?event.category,
                outcome = ?event.outcome,
                correlation_id = %event.correlation_id,
                service_request_id = %service_request_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit event recorded"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        audit::{
            AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
            TracingAuditSink,
        },
        domain::request::ServiceRequestId,
    };

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        sink.emit(
            AuditEvent::new(
                Some(ServiceRequestId("SR-42".to_owned())),
                "req-123",
                "flow.transition_applied",
                AuditCategory::Flow,
                "user-1",
                AuditOutcome::Success,
            )
            .with_metadata("from", "Draft")
            .with_metadata("to", "Submitted"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-123");
        assert_eq!(
            events[0].service_request_id.as_ref().map(|id| id.0.as_str()),
            Some("SR-42")
        );
        assert!(events[0].metadata.contains_key("from"));
    }

    #[test]
    fn events_built_from_context_carry_its_identity() {
        let context = AuditContext::new(None, "req-7", "pm-3");
        let event = AuditEvent::from_context(
            &context,
            "order.created",
            AuditCategory::Order,
            AuditOutcome::Success,
        );

        assert_eq!(event.actor, "pm-3");
        assert_eq!(event.correlation_id, "req-7");
        assert!(event.service_request_id.is_none());
        TracingAuditSink.emit(event);
    }
}
