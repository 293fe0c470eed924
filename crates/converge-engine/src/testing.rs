//! In-memory [`ResourceApi`] and clock for engine tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use converge_client::{ActionResponse, Error, Query, ResourceApi, Result, expand_path};
use serde_json::{Value, json};

use crate::poll::Clock;

pub(crate) const BASE: &str = "https://waldur.test";

/// A remote object with `uuid`, `url` and `name`.
pub(crate) fn resource(collection: &str, uuid: &str, name: &str) -> Value {
    json!({
        "uuid": uuid,
        "url": format!("{BASE}/api/{collection}/{uuid}/"),
        "name": name,
    })
}

/// One recorded API call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    List { op: String, query: Vec<(String, String)> },
    Retrieve { path: String },
    Create { path: String, body: Value },
    Update { path: String, body: Value },
    Destroy { path: String },
    Action { path: String, body: Value },
    OrderCreate { body: Value },
    OrderPoll { uuid: String },
    Terminate { uuid: String, body: Value },
}

impl Call {
    pub(crate) fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::Create { .. }
                | Call::Update { .. }
                | Call::Destroy { .. }
                | Call::Action { .. }
                | Call::OrderCreate { .. }
                | Call::Terminate { .. }
        )
    }
}

/// Canned response.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Ok(Value),
    NotFound,
    Status(u16, String),
}

impl Reply {
    fn into_result(self, path: &str) -> Result<Value> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::NotFound => Err(Error::NotFound(path.to_string())),
            Reply::Status(status, message) => Err(Error::Api {
                status,
                url: path.to_string(),
                message,
            }),
        }
    }
}

struct ListRule {
    op: String,
    query: Vec<(String, String)>,
    items: Vec<Value>,
}

/// Scripted API that records every call.
///
/// Lists match by endpoint and a subset of query pairs; the most recently
/// registered matching rule wins and unmatched lists are empty. Reply
/// queues yield their entries in order and then keep repeating the last.
#[derive(Default)]
pub(crate) struct MockApi {
    lists: Mutex<Vec<ListRule>>,
    retrieves: Mutex<HashMap<String, VecDeque<Reply>>>,
    creates: Mutex<VecDeque<Reply>>,
    actions: Mutex<VecDeque<u16>>,
    orders: Mutex<VecDeque<Reply>>,
    polls: Mutex<VecDeque<Value>>,
    calls: Mutex<Vec<Call>>,
}

impl MockApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_list(&self, op: &str, query: &[(&str, &str)], items: Vec<Value>) {
        self.lists.lock().unwrap().push(ListRule {
            op: op.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            items,
        });
    }

    pub(crate) fn on_retrieve(&self, path: &str, value: Value) {
        self.on_retrieve_sequence(path, vec![Reply::Ok(value)]);
    }

    pub(crate) fn on_retrieve_sequence(&self, path: &str, replies: Vec<Reply>) {
        self.retrieves
            .lock()
            .unwrap()
            .insert(path.to_string(), replies.into());
    }

    pub(crate) fn on_create(&self, reply: Reply) {
        self.creates.lock().unwrap().push_back(reply);
    }

    /// Status codes answered by action endpoints (200 when unset).
    pub(crate) fn on_action(&self, status: u16) {
        self.actions.lock().unwrap().push_back(status);
    }

    pub(crate) fn on_order(&self, reply: Reply) {
        self.orders.lock().unwrap().push_back(reply);
    }

    pub(crate) fn on_poll(&self, states: Vec<Value>) {
        self.polls.lock().unwrap().extend(states);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::List { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn next<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

fn merge(mut base: Value, extra: Value) -> Value {
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}

impl ResourceApi for MockApi {
    fn list(&self, op: &str, query: &Query) -> Result<Vec<Value>> {
        self.record(Call::List {
            op: op.to_string(),
            query: query.to_vec(),
        });
        let lists = self.lists.lock().unwrap();
        Ok(lists
            .iter()
            .rev()
            .find(|rule| rule.op == op && rule.query.iter().all(|pair| query.contains(pair)))
            .map(|rule| rule.items.clone())
            .unwrap_or_default())
    }

    fn retrieve(&self, op: &str, uuid: &str) -> Result<Value> {
        let path = expand_path(op, &[("uuid", uuid)])?;
        self.record(Call::Retrieve { path: path.clone() });
        let mut retrieves = self.retrieves.lock().unwrap();
        let reply = retrieves
            .get_mut(&path)
            .and_then(next)
            .unwrap_or(Reply::NotFound);
        reply.into_result(&path)
    }

    fn create(&self, op: &str, path_params: &[(&str, &str)], body: &Value) -> Result<Value> {
        let path = expand_path(op, path_params)?;
        self.record(Call::Create {
            path: path.clone(),
            body: body.clone(),
        });
        let reply = next(&mut *self.creates.lock().unwrap()).unwrap_or_else(|| {
            Reply::Ok(merge(
                body.clone(),
                json!({"uuid": "new-uuid", "url": format!("{BASE}{path}new-uuid/")}),
            ))
        });
        reply.into_result(&path)
    }

    fn update(&self, op: &str, uuid: &str, body: &Value) -> Result<Value> {
        let path = expand_path(op, &[("uuid", uuid)])?;
        self.record(Call::Update {
            path: path.clone(),
            body: body.clone(),
        });
        Ok(merge(body.clone(), json!({"uuid": uuid})))
    }

    fn destroy(&self, op: &str, uuid: &str) -> Result<()> {
        let path = expand_path(op, &[("uuid", uuid)])?;
        self.record(Call::Destroy { path });
        Ok(())
    }

    fn action(&self, op: &str, uuid: &str, body: &Value) -> Result<ActionResponse> {
        let path = expand_path(op, &[("uuid", uuid)])?;
        self.record(Call::Action {
            path,
            body: body.clone(),
        });
        let status = next(&mut *self.actions.lock().unwrap()).unwrap_or(200);
        Ok(ActionResponse { status, body: None })
    }

    fn order_create(&self, body: &Value) -> Result<Value> {
        self.record(Call::OrderCreate { body: body.clone() });
        next(&mut *self.orders.lock().unwrap())
            .unwrap_or_else(|| Reply::Ok(json!({"uuid": "order-1", "state": "pending-consumer"})))
            .into_result(converge_client::ORDERS_PATH)
    }

    fn order_poll(&self, order_uuid: &str) -> Result<Value> {
        self.record(Call::OrderPoll {
            uuid: order_uuid.to_string(),
        });
        Ok(next(&mut *self.polls.lock().unwrap())
            .unwrap_or_else(|| json!({"uuid": order_uuid, "state": "done"})))
    }

    fn terminate(&self, resource_uuid: &str, body: &Value) -> Result<Value> {
        self.record(Call::Terminate {
            uuid: resource_uuid.to_string(),
            body: body.clone(),
        });
        Ok(Value::Null)
    }
}

/// Virtual clock: sleeping advances time instantly.
pub(crate) struct FakeClock {
    start: Instant,
    sleeps: RefCell<Vec<Duration>>,
}

impl FakeClock {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.sleeps.borrow().iter().sum()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}
