//! Designated handlers installed until the application replaces them.

use crate::answer::Answer;
use crate::asked::Asked;
use crate::context::RouteContext;
use http::StatusCode;
use tracing::{error, info, warn};

/// Replies with a generic 500, never leaking the cause to the client.
pub fn internal_error(asked: &Asked, answer: &mut Answer) {
    let route = answer.route_context().map(|ctx| ctx.route().to_string()).unwrap_or_default();
    match answer.error() {
        Some(cause) => error!(request_id = asked.id(), %route, %cause, "request failed"),
        None => error!(request_id = asked.id(), %route, "request failed"),
    }
    answer.status(StatusCode::INTERNAL_SERVER_ERROR);
    answer.close("Internal Server Error");
}

/// Refuses bodies larger than the route allows and closes the connection.
pub fn payload_too_large(asked: &Asked, answer: &mut Answer, route: &RouteContext) {
    warn!(request_id = asked.id(), route = %route.route(), "request body exceeds the allowed length");
    answer.status(StatusCode::PAYLOAD_TOO_LARGE);
    answer.close("Payload Too Large");
}

pub fn not_found(asked: &Asked, answer: &mut Answer) {
    info!(request_id = asked.id(), method = %asked.method(), path = asked.uri().path(), "no route found");
    answer.status(StatusCode::NOT_FOUND);
    answer.send("Not Found");
}
