//! Centralized change-notification feed
//!
//! One broadcast channel per entity type. Handlers publish a change event
//! after every successful mutation, and every WebSocket subscriber of that
//! entity type observes the same ordered stream. This replaces the
//! one-ad-hoc-subscription-per-view pattern with a single fan-out point.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::state::AppState;

/// Events buffered per channel before slow subscribers start lagging
const FEED_CAPACITY: usize = 256;

/// Entity types a client can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTable {
    Spots,
    Trips,
    TripRequests,
    Messages,
}

/// What happened to the row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

/// A single row change, with the new and/or old row as JSON
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub table: EntityTable,
    pub action: ChangeAction,
    pub record: Option<Value>,
    pub old_record: Option<Value>,
}

/// Column equality predicate applied to the event's row payload
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionFilter {
    pub column: String,
    pub value: Value,
}

impl SubscriptionFilter {
    /// Whether the event's row (new row, falling back to the old row for
    /// deletes) satisfies the predicate
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        let row = event.record.as_ref().or(event.old_record.as_ref());
        match row {
            Some(Value::Object(map)) => map.get(&self.column) == Some(&self.value),
            _ => false,
        }
    }
}

/// Broadcast feed with one channel per entity type
#[derive(Clone)]
pub struct ChangeFeed {
    spots: broadcast::Sender<ChangeEvent>,
    trips: broadcast::Sender<ChangeEvent>,
    trip_requests: broadcast::Sender<ChangeEvent>,
    messages: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Create a feed with empty channels
    pub fn new() -> Self {
        Self {
            spots: broadcast::channel(FEED_CAPACITY).0,
            trips: broadcast::channel(FEED_CAPACITY).0,
            trip_requests: broadcast::channel(FEED_CAPACITY).0,
            messages: broadcast::channel(FEED_CAPACITY).0,
        }
    }

    fn sender(&self, table: EntityTable) -> &broadcast::Sender<ChangeEvent> {
        match table {
            EntityTable::Spots => &self.spots,
            EntityTable::Trips => &self.trips,
            EntityTable::TripRequests => &self.trip_requests,
            EntityTable::Messages => &self.messages,
        }
    }

    /// Subscribe to one entity type's stream
    pub fn subscribe(&self, table: EntityTable) -> broadcast::Receiver<ChangeEvent> {
        self.sender(table).subscribe()
    }

    /// Publish an insert event
    pub fn publish_insert<T: Serialize>(&self, table: EntityTable, record: &T) {
        self.publish(table, ChangeAction::Insert, Some(record), None::<&T>);
    }

    /// Publish an update event; the old row is optional
    pub fn publish_update<T: Serialize>(&self, table: EntityTable, record: &T, old: Option<&T>) {
        self.publish(table, ChangeAction::Update, Some(record), old);
    }

    /// Publish a delete event carrying the removed row
    pub fn publish_delete<T: Serialize>(&self, table: EntityTable, old: &T) {
        self.publish(table, ChangeAction::Delete, None::<&T>, Some(old));
    }

    fn publish<T: Serialize>(
        &self,
        table: EntityTable,
        action: ChangeAction,
        record: Option<&T>,
        old_record: Option<&T>,
    ) {
        let to_value = |value: &T| match serde_json::to_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                error!("Failed to serialize change event payload: {}", e);
                None
            }
        };

        let event = ChangeEvent {
            table,
            action,
            record: record.and_then(to_value),
            old_record: old_record.and_then(to_value),
        };

        // A send error only means nobody is subscribed right now.
        let _ = self.sender(table).send(event);
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// A client's subscribe message
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub table: EntityTable,
    pub filter: Option<SubscriptionFilter>,
}

#[derive(Debug, Deserialize)]
struct ClientMessage {
    subscribe: Option<SubscribeRequest>,
}

/// WebSocket endpoint for the change feed (behind the auth middleware)
pub async fn realtime_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let feed = state.change_feed.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, feed))
}

async fn handle_socket(mut socket: WebSocket, feed: ChangeFeed) {
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    let mut forwarders: Vec<JoinHandle<()>> = Vec::new();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage { subscribe: Some(request) }) => {
                                let rx = feed.subscribe(request.table);
                                forwarders.push(tokio::spawn(forward_events(
                                    rx,
                                    request.filter,
                                    out_tx.clone(),
                                )));

                                let ack = json!({ "subscribed": request.table }).to_string();
                                if socket.send(WsMessage::Text(ack)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                let reply = json!({ "error": format!("Invalid message: {}", e) })
                                    .to_string();
                                if socket.send(WsMessage::Text(reply)).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            Some(payload) = out_rx.recv() => {
                if socket.send(WsMessage::Text(payload)).await.is_err() {
                    break;
                }
            }
        }
    }

    // Subscriptions end with the connection, like view unmount teardown.
    for handle in forwarders {
        handle.abort();
    }
}

async fn forward_events(
    mut rx: broadcast::Receiver<ChangeEvent>,
    filter: Option<SubscriptionFilter>,
    out: mpsc::Sender<String>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if filter.as_ref().is_none_or(|f| f.matches(&event)) {
                    match serde_json::to_string(&event) {
                        Ok(payload) => {
                            if out.send(payload).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!("Failed to serialize change event: {}", e),
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // The client missed events; tell it to refetch instead of
                // pretending the stream is complete.
                warn!("Realtime subscriber lagged, skipped {} events", skipped);
                let notice = json!({ "error": "lagged", "skipped": skipped }).to_string();
                if out.send(notice).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe(EntityTable::Trips);

        feed.publish_insert(EntityTable::Trips, &json!({"id": "t1"}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.table, EntityTable::Trips);
        assert_eq!(event.action, ChangeAction::Insert);
        assert_eq!(event.record, Some(json!({"id": "t1"})));
        assert_eq!(event.old_record, None);
    }

    #[tokio::test]
    async fn test_channels_are_isolated_per_entity_type() {
        let feed = ChangeFeed::new();
        let mut trips_rx = feed.subscribe(EntityTable::Trips);
        let mut messages_rx = feed.subscribe(EntityTable::Messages);

        feed.publish_insert(EntityTable::Messages, &json!({"id": "m1"}));

        let event = messages_rx.recv().await.unwrap();
        assert_eq!(event.table, EntityTable::Messages);
        assert!(trips_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_events_keep_publish_order() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe(EntityTable::TripRequests);

        for n in 0..5 {
            feed.publish_insert(EntityTable::TripRequests, &json!({"seq": n}));
        }

        for n in 0..5 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.record, Some(json!({"seq": n})));
        }
    }

    #[test]
    fn test_filter_matches_on_record_column() {
        let filter = SubscriptionFilter {
            column: "trip_id".to_string(),
            value: json!("t1"),
        };

        let matching = ChangeEvent {
            table: EntityTable::Messages,
            action: ChangeAction::Insert,
            record: Some(json!({"id": "m1", "trip_id": "t1"})),
            old_record: None,
        };
        let other = ChangeEvent {
            table: EntityTable::Messages,
            action: ChangeAction::Insert,
            record: Some(json!({"id": "m2", "trip_id": "t2"})),
            old_record: None,
        };

        assert!(filter.matches(&matching));
        assert!(!filter.matches(&other));
    }

    #[test]
    fn test_filter_falls_back_to_old_record_for_deletes() {
        let filter = SubscriptionFilter {
            column: "id".to_string(),
            value: json!("s1"),
        };

        let event = ChangeEvent {
            table: EntityTable::Spots,
            action: ChangeAction::Delete,
            record: None,
            old_record: Some(json!({"id": "s1"})),
        };

        assert!(filter.matches(&event));
    }
}
