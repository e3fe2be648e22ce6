//! # Router Scenarios
//!
//! End-to-end flows through router, component managers and channels, driven
//! by the scripted transport:
//!
//! 1. **Directory reconnect:** a lookup issued while the directory channel is
//!    closing rides the reconnect instead of failing
//! 2. **Exactly-once delivery:** a mix of successes, rejections, timeouts and
//!    a dropped component yields one outcome per request
//! 3. **Foreign threads:** requests submitted from plain OS threads

#[cfg(test)]
mod tests {
    use component_router::codes;
    use component_router::test_utils::{
        address_reply, settle, Harness, RecordingCallback, ScriptedConnection, DIRECTORY_HOST,
        DIRECTORY_PORT,
    };
    use component_router::{RequestId, RequestParams, RouterConfig};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn send(harness: &Harness, component: &str, request_id: RequestId, callback: &Arc<RecordingCallback>) {
        harness.router.send_request(
            RequestParams::new().with("seq", request_id),
            request_id,
            Duration::from_secs(5),
            &format!("{component}.call"),
            component,
            callback.clone(),
        );
    }

    async fn accepted_directory(harness: &Harness) -> ScriptedConnection {
        let directory = harness.directory().expect("directory connection");
        directory.accept();
        settle().await;
        directory
    }

    async fn eventually(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    // =============================================================================
    // SCENARIOS
    // =============================================================================

    #[tokio::test]
    async fn test_lookup_rides_directory_reconnect() {
        let harness = Harness::new();
        harness.transport.manual_close(true);
        let callback = RecordingCallback::shared();

        send(&harness, "billing", 1, &callback);
        let first = accepted_directory(&harness).await;
        first.reply(-5001, address_reply("10.0.0.5", 9000));
        settle().await;
        harness
            .connection("10.0.0.5", 9000)
            .expect("billing connection")
            .accept();
        settle().await;

        // Idle directory is wound down but its close has not completed yet.
        harness.router.destroy_component("ds");
        assert!(first.is_closed());

        send(&harness, "crm", 2, &callback);
        assert_eq!(first.sent_ids(), vec![-5001]);

        first.finish_close();
        settle().await;

        let connections = harness.transport.connections_to(DIRECTORY_HOST, DIRECTORY_PORT);
        assert_eq!(connections.len(), 2);
        let second = accepted_directory(&harness).await;
        assert_eq!(second.sent_ids(), vec![-5002]);

        second.reply(-5002, address_reply("10.0.0.6", 9100));
        settle().await;
        let crm = harness.connection("10.0.0.6", 9100).expect("crm connection");
        crm.accept();
        settle().await;
        crm.reply(2, json!({"status": 200}));
        settle().await;

        assert_eq!(callback.successes(), vec![(2, json!({"status": 200}))]);
        assert!(callback.failure_codes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_request_gets_exactly_one_outcome() {
        let harness = Harness::new();
        let callback = RecordingCallback::shared();

        // billing: ids 1..=4, crm: 5..=6, ghost: 7
        for id in 1..=4 {
            send(&harness, "billing", id, &callback);
        }
        send(&harness, "crm", 5, &callback);
        send(&harness, "crm", 6, &callback);
        send(&harness, "ghost", 7, &callback);
        assert_eq!(harness.router.pending_count(), 7);
        assert_eq!(harness.router.outstanding_lookups(), 3);

        let directory = accepted_directory(&harness).await;
        directory.reply(-5001, address_reply("10.0.0.5", 9000));
        directory.reply(-5002, address_reply("10.0.0.6", 9100));
        directory.reply(-5003, json!({"status": -5006, "msg": "unknown component"}));
        settle().await;

        let billing = harness.connection("10.0.0.5", 9000).expect("billing");
        let crm = harness.connection("10.0.0.6", 9100).expect("crm");
        billing.accept();
        crm.accept();
        settle().await;

        billing.reply(1, json!({"ok": 1}));
        billing.reply(2, json!({"ok": 2}));
        billing.reply(2, json!({"ok": "again"}));
        crm.reply(5, json!({"ok": 5}));
        settle().await;

        // 3 and 4 stay unanswered; crm goes away with 6 in flight.
        crm.drop_connection();
        settle().await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;
        billing.reply(3, json!({"late": true}));
        settle().await;

        for id in 1..=7 {
            assert_eq!(callback.outcomes_for(id).len(), 1, "request {id}");
        }
        let mut failures = callback.failure_codes();
        failures.sort_unstable();
        assert_eq!(
            failures,
            vec![
                (3, codes::REQUEST_TIMEOUT),
                (4, codes::REQUEST_TIMEOUT),
                (6, codes::NETWORK_ERROR),
                (7, codes::SERVER_ERROR),
            ]
        );
        assert_eq!(harness.router.pending_count(), 0);
        assert_eq!(harness.router.in_flight_count(), 0);

        let stats = harness.router.stats();
        assert_eq!(stats.submitted, 7);
        assert_eq!(stats.lookups_issued, 3);
        assert_eq!(stats.failures, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_requests_from_foreign_threads() {
        let harness = Harness::with_config(RouterConfig::default());
        let callback = RecordingCallback::shared();

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let router = harness.router.clone();
                let callback = callback.clone();
                std::thread::spawn(move || {
                    for i in 0..5 {
                        let id = worker * 100 + i;
                        router.send_request(
                            RequestParams::new(),
                            id,
                            Duration::from_secs(5),
                            "billing.call",
                            "billing",
                            callback.clone(),
                        );
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker thread");
        }

        assert_eq!(harness.router.pending_count(), 20);
        assert_eq!(harness.router.outstanding_lookups(), 1);

        let directory = harness.directory().expect("directory connection");
        directory.accept();
        eventually(|| directory.sent_ids() == vec![-5001]).await;
        directory.reply(-5001, address_reply("10.0.0.5", 9000));

        eventually(|| harness.connection("10.0.0.5", 9000).is_some()).await;
        let billing = harness.connection("10.0.0.5", 9000).expect("billing");
        billing.accept();
        eventually(|| billing.sent_ids().len() == 20).await;

        for id in billing.sent_ids() {
            billing.reply(id, json!({"id": id}));
        }
        eventually(|| callback.successes().len() == 20).await;
        assert!(callback.failure_codes().is_empty());
    }
}
