use crate::handlers::drain::{drain, drain_queue, DRAIN_ENDPOINT, QUEUE_DRAIN_ENDPOINT};
use crate::handlers::drain_all::{drain_all, DRAIN_ALL_ENDPOINT};
use crate::handlers::enqueue::{enqueue, enqueue_queue, ENQUEUE_ENDPOINT, QUEUE_ENQUEUE_ENDPOINT};
use crate::handlers::health::{root, ROOT_ENDPOINT};
use crate::handlers::line_webhook::{line_webhook, LINE_WEBHOOK_ENDPOINT};
use crate::handlers::status::{queue_status, status, QUEUE_STATUS_ENDPOINT, STATUS_ENDPOINT};
use crate::state::GatewayState;
use axum::routing::{get, post, MethodRouter};
use std::sync::LazyLock;

pub(crate) static ROUTES: LazyLock<Vec<(&'static str, MethodRouter<GatewayState>)>> =
    LazyLock::new(|| {
        vec![
            (ROOT_ENDPOINT, get(root)),
            (ENQUEUE_ENDPOINT, post(enqueue)),
            (QUEUE_ENQUEUE_ENDPOINT, post(enqueue_queue)),
            (DRAIN_ENDPOINT, post(drain)),
            (QUEUE_DRAIN_ENDPOINT, post(drain_queue)),
            (STATUS_ENDPOINT, get(status)),
            (QUEUE_STATUS_ENDPOINT, get(queue_status)),
            (DRAIN_ALL_ENDPOINT, post(drain_all)),
            (LINE_WEBHOOK_ENDPOINT, post(line_webhook)),
        ]
    });
