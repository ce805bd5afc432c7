//! Indication fan-out.
//!
//! An indication goes to every authenticated session the authorizer accepts
//! at the moment of sending. Authorization is asked afresh for each
//! indication and each session; a refusal or an authorizer error only skips
//! that session.

use std::sync::Arc;

use futures_util::future::join_all;

use fbws_core::codec::encode;
use fbws_core::error::FbwsResult;
use fbws_core::messages::{Envelope, Indication};

use crate::auth::Authorizer;
use crate::session::Session;

/// Send `ind` to each eligible session. Returns how many it reached.
pub async fn fan_out(
    authorizer: &dyn Authorizer,
    sessions: &[Arc<Session>],
    ind: Indication,
) -> FbwsResult<usize> {
    let text = encode(&Envelope::Ind(ind).into())?;

    let sends = sessions
        .iter()
        .filter(|s| s.is_authenticated())
        .map(|session| {
            let text = text.clone();
            async move {
                match authorizer.authorize(session.info()).await {
                    Ok(true) => session.connection().send_text(text).is_ok(),
                    Ok(false) => false,
                    Err(e) => {
                        session.connection().raise_error(e.to_string());
                        false
                    }
                }
            }
        });

    Ok(join_all(sends).await.into_iter().filter(|sent| *sent).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PermitAll;
    use crate::connection::{Connection, ConnectionEvent, EventKind};
    use crate::session::SessionInfo;
    use async_trait::async_trait;
    use fbws_core::error::FbwsError;
    use fbws_core::transport::Outbound;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn session(authenticated: bool) -> (Arc<Session>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let s = Arc::new(Session::new(Arc::new(Connection::new(tx, None))));
        if authenticated {
            s.mark_authenticated();
        }
        (s, rx)
    }

    fn ind() -> Indication {
        Indication {
            subsys: "gad".into(),
            ind_type: "attrsReport".into(),
            id: Some(json!(12)),
            data: json!({ "onOff": false }),
        }
    }

    /// Allows only the listed sessions, fails for none, counts every call.
    struct Only {
        allowed: Vec<u64>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Authorizer for Only {
        async fn authorize(&self, session: &SessionInfo) -> FbwsResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.allowed.contains(&session.id))
        }
    }

    struct Broken;

    #[async_trait]
    impl Authorizer for Broken {
        async fn authorize(&self, _: &SessionInfo) -> FbwsResult<bool> {
            Err(FbwsError::Other("acl unavailable".into()))
        }
    }

    #[tokio::test]
    async fn reaches_authenticated_sessions_only() {
        let (a, mut a_rx) = session(true);
        let (b, mut b_rx) = session(false);

        let sent = fan_out(&PermitAll, &[a, b], ind()).await.unwrap();
        assert_eq!(sent, 1);
        assert!(matches!(a_rx.try_recv(), Ok(Outbound::Text(_))));
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn authorization_is_asked_every_time() {
        let (a, mut a_rx) = session(true);
        let (b, mut b_rx) = session(true);
        let auth = Only {
            allowed: vec![a.id()],
            calls: AtomicUsize::new(0),
        };
        let sessions = [a, b];

        assert_eq!(fan_out(&auth, &sessions, ind()).await.unwrap(), 1);
        assert_eq!(fan_out(&auth, &sessions, ind()).await.unwrap(), 1);
        assert_eq!(auth.calls.load(Ordering::SeqCst), 4);

        assert!(a_rx.try_recv().is_ok());
        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn authorizer_error_raises_and_skips() {
        let (a, mut a_rx) = session(true);
        let errors = Arc::new(Mutex::new(Vec::new()));
        {
            let errors = Arc::clone(&errors);
            a.listen(
                EventKind::Error,
                Arc::new(move |e: &ConnectionEvent| errors.lock().unwrap().push(e.clone())),
            );
        }

        assert_eq!(fan_out(&Broken, &[Arc::clone(&a)], ind()).await.unwrap(), 0);
        assert!(a_rx.try_recv().is_err());
        assert_eq!(
            *errors.lock().unwrap(),
            vec![ConnectionEvent::Error("acl unavailable".into())]
        );
    }
}
