//! Request dispatch for authenticated sessions.

use serde_json::Value;

use fbws_core::messages::{Envelope, Request, Response, RspCode};

use crate::auth::Authorizer;
use crate::operations::OperationRegistry;
use crate::session::Session;

const AUTHORIZE_FAILURE: &str = "Authorize failure.";

/// Authorize, run and answer one request.
///
/// Exactly one response is sent per request: UNAUTHORIZED when the
/// authorizer refuses or fails, FAIL when the operation is unknown or
/// errors, SUCCESS with the operation's result otherwise.
pub async fn handle_request(
    operations: &dyn OperationRegistry,
    authorizer: &dyn Authorizer,
    session: &Session,
    mut req: Request,
) {
    let conn = session.connection();

    let (status, data) = match authorizer.authorize(session.info()).await {
        Err(e) => {
            conn.raise_error(e.to_string());
            (RspCode::Unauthorized, Value::String(e.to_string()))
        }
        Ok(false) => (RspCode::Unauthorized, Value::String(AUTHORIZE_FAILURE.into())),
        Ok(true) => match operations.find(&req.subsys, &req.cmd) {
            None => {
                tracing::debug!(subsys = %req.subsys, cmd = %req.cmd, "no such operation");
                (RspCode::Fail, Value::Null)
            }
            Some(op) => match op(std::mem::take(&mut req.args)).await {
                Ok(result) => (RspCode::Success, result),
                Err(e) => {
                    tracing::debug!(subsys = %req.subsys, cmd = %req.cmd, error = %e, "operation failed");
                    (RspCode::Fail, Value::Null)
                }
            },
        },
    };

    tracing::debug!(
        conn = session.id(),
        subsys = %req.subsys,
        cmd = %req.cmd,
        seq = req.seq,
        status = ?status,
        "request handled"
    );

    let rsp = Response::to_request(req, status, data);
    if let Err(e) = conn.send(&Envelope::Rsp(rsp).into()) {
        tracing::debug!(conn = session.id(), error = %e, "response not delivered");
    }
}
