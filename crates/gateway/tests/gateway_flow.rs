//! End-to-end gateway scenarios against in-memory transport doubles.
//!
//! The mock exchange records every outbound command and lets tests inject
//! inbound events; the recording sink captures every FIX message the
//! gateway produces. The real dispatch loop runs as a task.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

use iris_gateway::messages::exchange::{
    BookLevel, ExchangeEvent, Notification, NotificationKind, NotificationStatus, OrderCommand,
    OrderState, SubscriptionId, SubscriptionRequest, TradeFill,
};
use iris_gateway::messages::fix::{FixMessage, MsgType, custom_tags, tags};
use iris_gateway::nonce::SequenceNonce;
use iris_gateway::symbology::PassthroughSymbology;
use iris_gateway::{
    ExchangeClient, ExchangeHandles, ExchangeQuery, FixSink, Gateway, GatewayConfig,
    HandleFactory, TransportError, run_dispatch,
};

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<(String, FixMessage)>>,
}

impl RecordingSink {
    fn get(&self, index: usize) -> Option<(String, FixMessage)> {
        self.messages.lock().unwrap().get(index).cloned()
    }

    fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl FixSink for RecordingSink {
    fn send(&self, session_id: &str, message: FixMessage) -> Result<(), TransportError> {
        self.messages
            .lock()
            .unwrap()
            .push((session_id.to_string(), message));
        Ok(())
    }
}

#[derive(Default)]
struct MockExchange {
    event_tx: Mutex<Option<mpsc::Sender<ExchangeEvent>>>,
    commands: Mutex<Vec<OrderCommand>>,
    subscribe_requests: Mutex<Vec<SubscriptionRequest>>,
    unsubscribed: Mutex<Vec<SubscriptionId>>,
    next_sub_id: AtomicI64,
    query_status: Mutex<Option<OrderState>>,
    trade_history: Mutex<Vec<TradeFill>>,
    book: Mutex<Vec<BookLevel>>,
}

impl MockExchange {
    async fn inject(&self, event: ExchangeEvent) {
        let sender = self
            .event_tx
            .lock()
            .unwrap()
            .clone()
            .expect("exchange not connected");
        sender.send(event).await.expect("event stream closed");
    }

    fn commands(&self) -> Vec<OrderCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn connect(&self) -> Result<mpsc::Receiver<ExchangeEvent>, TransportError> {
        let (tx, rx) = mpsc::channel(64);
        tx.try_send(ExchangeEvent::AuthResult {
            success: true,
            user_id: Some("user-1".to_string()),
            text: None,
        })
        .unwrap();
        *self.event_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn credentials(
        &self,
        _api_key: &str,
        _api_secret: &str,
        _nonce: u64,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.event_tx.lock().unwrap().is_some()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.event_tx.lock().unwrap().take();
        Ok(())
    }

    async fn subscribe(
        &self,
        request: SubscriptionRequest,
    ) -> Result<SubscriptionId, TransportError> {
        self.subscribe_requests.lock().unwrap().push(request);
        Ok(self.next_sub_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        self.unsubscribed.lock().unwrap().push(id);
        Ok(())
    }

    async fn send(&self, command: OrderCommand) -> Result<(), TransportError> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

#[async_trait]
impl ExchangeQuery for MockExchange {
    async fn order_status(&self, order_id: i64) -> Result<OrderState, TransportError> {
        self.query_status
            .lock()
            .unwrap()
            .clone()
            .filter(|state| state.order_id == order_id)
            .ok_or(TransportError::NotConnected)
    }

    async fn order_trades(
        &self,
        _symbol: &str,
        order_id: i64,
    ) -> Result<Vec<TradeFill>, TransportError> {
        Ok(self
            .trade_history
            .lock()
            .unwrap()
            .iter()
            .filter(|fill| fill.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn book_snapshot(
        &self,
        _symbol: &str,
        _precision: &str,
        _length: u32,
    ) -> Result<Vec<BookLevel>, TransportError> {
        Ok(self.book.lock().unwrap().clone())
    }
}

struct Harness {
    gateway: Arc<Gateway>,
    sink: Arc<RecordingSink>,
    exchange: Arc<MockExchange>,
    seen: usize,
}

impl Harness {
    async fn next_message(&mut self) -> FixMessage {
        let index = self.seen;
        let sink = Arc::clone(&self.sink);
        let (_, message) = tokio::time::timeout(Duration::from_secs(2), async move {
            loop {
                if let Some(entry) = sink.get(index) {
                    return entry;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for FIX message");
        self.seen += 1;
        message
    }
}

const SESSION: &str = "FIX.4.2:CLIENT->GATEWAY";

async fn logged_on_harness() -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let exchange = Arc::new(MockExchange::default());
    let sink = Arc::new(RecordingSink::default());
    let factory: HandleFactory = {
        let exchange = Arc::clone(&exchange);
        Box::new(move |_session_id: &str| ExchangeHandles {
            client: Arc::clone(&exchange) as Arc<dyn ExchangeClient>,
            query: Arc::clone(&exchange) as Arc<dyn ExchangeQuery>,
        })
    };
    let config = GatewayConfig {
        counterparty: "testcp".to_string(),
        auth_timeout_secs: 2,
        subscribe_timeout_secs: 2,
        ..GatewayConfig::default()
    };
    let (gateway, events) = Gateway::new(
        factory,
        Arc::clone(&sink) as Arc<dyn FixSink>,
        Arc::new(PassthroughSymbology),
        Arc::new(SequenceNonce::starting_at(1)),
        config,
    );
    tokio::spawn(run_dispatch(Arc::clone(&gateway), events));

    gateway.on_session_created(SESSION);
    let mut logon = FixMessage::new(MsgType::Logon);
    logon
        .set(custom_tags::API_KEY, "key")
        .set(custom_tags::API_SECRET, "secret")
        .set(custom_tags::EXCHANGE_USER_ID, "user-1");
    gateway.on_logon(SESSION, &logon).await;
    assert!(gateway.find_peer(SESSION).is_some());

    Harness {
        gateway,
        sink,
        exchange,
        seen: 0,
    }
}

fn new_order_single(cl_ord_id: &str, qty: Decimal, price: Decimal) -> FixMessage {
    let mut message = FixMessage::new(MsgType::NewOrderSingle);
    message
        .set(tags::CL_ORD_ID, cl_ord_id)
        .set(tags::SYMBOL, "tBTCUSD")
        .set(tags::SIDE, '1')
        .set(tags::ORD_TYPE, '2')
        .set(tags::ORDER_QTY, qty)
        .set(tags::PRICE, price)
        .set(tags::TIME_IN_FORCE, '1');
    message
}

fn active_state(order_id: i64, cid: i64, status: &str) -> OrderState {
    OrderState {
        order_id,
        cid: Some(cid),
        symbol: "tBTCUSD".to_string(),
        amount: dec!(1),
        amount_orig: dec!(1),
        price: dec!(12000),
        order_type: "EXCHANGE LIMIT".to_string(),
        status: status.to_string(),
        flags: None,
    }
}

fn notification(kind: NotificationKind, status: NotificationStatus, text: &str, order: OrderState) -> ExchangeEvent {
    ExchangeEvent::Notification(Notification {
        kind,
        status,
        text: text.to_string(),
        order,
    })
}

#[tokio::test]
async fn test_order_flow_end_to_end() {
    let mut harness = logged_on_harness().await;

    // Submit: NewOrderSingle 555, BUY 1 @ 12000.
    harness
        .gateway
        .on_app_message(SESSION, &new_order_single("555", dec!(1), dec!(12000)))
        .await
        .unwrap();
    let commands = harness.exchange.commands();
    assert_eq!(commands.len(), 1);
    match &commands[0] {
        OrderCommand::Submit(payload) => {
            assert_eq!(payload.cid, 555);
            assert_eq!(payload.amount, dec!(1));
            assert_eq!(payload.price, Some(dec!(12000)));
            assert_eq!(payload.order_type, "EXCHANGE LIMIT");
        }
        other => panic!("expected submit, got {other:?}"),
    }

    // Acknowledge: New report, leaves 1, cum 0.
    harness
        .exchange
        .inject(notification(
            NotificationKind::OrderNew,
            NotificationStatus::Success,
            "",
            active_state(1234, 555, "ACTIVE"),
        ))
        .await;
    let report = harness.next_message().await;
    assert_eq!(report.msg_type, MsgType::ExecutionReport);
    assert_eq!(report.fields.get_opt(tags::CL_ORD_ID), Some("555"));
    assert_eq!(report.fields.get_opt(tags::ORDER_ID), Some("1234"));
    assert_eq!(report.fields.get_char(tags::EXEC_TYPE).unwrap(), '0');
    assert_eq!(report.fields.get_char(tags::ORD_STATUS).unwrap(), '0');
    assert_eq!(report.fields.get_decimal(tags::LEAVES_QTY).unwrap(), dec!(1));
    assert_eq!(report.fields.get_decimal(tags::CUM_QTY).unwrap(), dec!(0));

    // Partial fill of 0.2168 @ 12000.
    harness
        .exchange
        .inject(ExchangeEvent::TradeExecution(TradeFill {
            exec_id: 9001,
            order_id: 1234,
            symbol: "tBTCUSD".to_string(),
            exec_price: dec!(12000),
            exec_amount: dec!(0.2168),
            fee: Some(dec!(-0.0004)),
            fee_currency: Some("BTC".to_string()),
            cid: Some(555),
        }))
        .await;
    let report = harness.next_message().await;
    assert_eq!(report.fields.get_char(tags::EXEC_TYPE).unwrap(), '1');
    assert_eq!(report.fields.get_char(tags::ORD_STATUS).unwrap(), '1');
    assert_eq!(
        report.fields.get_decimal(tags::LEAVES_QTY).unwrap(),
        dec!(0.7832)
    );
    assert_eq!(
        report.fields.get_decimal(tags::CUM_QTY).unwrap(),
        dec!(0.2168)
    );
    assert_eq!(report.fields.get_decimal(tags::LAST_PX).unwrap(), dec!(12000));
    assert_eq!(
        report.fields.get_decimal(tags::LAST_QTY).unwrap(),
        dec!(0.2168)
    );
    assert_eq!(report.fields.get_opt(tags::EXEC_ID), Some("9001"));

    // Cancel the remainder; resolved through the cache by OrigClOrdID.
    let mut cancel = FixMessage::new(MsgType::OrderCancelRequest);
    cancel
        .set(tags::CL_ORD_ID, "cxl-1")
        .set(tags::ORIG_CL_ORD_ID, "555")
        .set(tags::SYMBOL, "tBTCUSD");
    harness.gateway.on_app_message(SESSION, &cancel).await.unwrap();
    let commands = harness.exchange.commands();
    assert_eq!(commands.last(), Some(&OrderCommand::Cancel { order_id: 1234 }));

    // Cancel ack: PendingCancel under the cancel's own ClOrdID.
    harness
        .exchange
        .inject(notification(
            NotificationKind::OrderCancel,
            NotificationStatus::Success,
            "",
            active_state(1234, 555, "ACTIVE"),
        ))
        .await;
    let report = harness.next_message().await;
    assert_eq!(report.fields.get_char(tags::EXEC_TYPE).unwrap(), '6');
    assert_eq!(report.fields.get_opt(tags::CL_ORD_ID), Some("cxl-1"));
    assert_eq!(report.fields.get_opt(tags::ORIG_CL_ORD_ID), Some("555"));

    // Terminal cancel with a plain CANCELED status: Canceled report with
    // zero leaves and the fills preserved in CumQty.
    harness
        .exchange
        .inject(ExchangeEvent::OrderCancel(active_state(
            1234, 555, "CANCELED",
        )))
        .await;
    let report = harness.next_message().await;
    assert_eq!(report.fields.get_char(tags::EXEC_TYPE).unwrap(), '4');
    assert_eq!(report.fields.get_char(tags::ORD_STATUS).unwrap(), '4');
    assert_eq!(
        report.fields.get_decimal(tags::LEAVES_QTY).unwrap(),
        dec!(0)
    );
    assert_eq!(
        report.fields.get_decimal(tags::CUM_QTY).unwrap(),
        dec!(0.2168)
    );
}

#[tokio::test]
async fn test_terminal_cancel_suppressed_for_partially_filled_status() {
    let mut harness = logged_on_harness().await;
    harness
        .gateway
        .on_app_message(SESSION, &new_order_single("556", dec!(1), dec!(12000)))
        .await
        .unwrap();
    harness
        .exchange
        .inject(notification(
            NotificationKind::OrderNew,
            NotificationStatus::Success,
            "",
            active_state(77, 556, "ACTIVE"),
        ))
        .await;
    harness.next_message().await;

    // Terminal cancel whose composite status says the order had fills:
    // no report, the trade execution owns that information.
    harness
        .exchange
        .inject(ExchangeEvent::OrderCancel(active_state(
            77,
            556,
            "CANCELED was: PARTIALLY FILLED @ 11999.0(0.05)",
        )))
        .await;
    // Fence event so the absence is observable.
    harness
        .exchange
        .inject(ExchangeEvent::PositionUpdate(
            iris_gateway::messages::exchange::PositionState {
                symbol: "tBTCUSD".to_string(),
                amount: dec!(1),
                base_price: dec!(12000),
            },
        ))
        .await;
    let next = harness.next_message().await;
    assert_eq!(next.msg_type, MsgType::PositionReport);
    assert_eq!(harness.sink.len(), harness.seen);
}

#[tokio::test]
async fn test_exchange_unknown_order_cancel_maps_to_none_sentinel() {
    let mut harness = logged_on_harness().await;

    // Cancel by explicit exchange order id the exchange will not recognize.
    let mut cancel = FixMessage::new(MsgType::OrderCancelRequest);
    cancel
        .set(tags::CL_ORD_ID, "cxl-2")
        .set(tags::ORIG_CL_ORD_ID, "999")
        .set(tags::ORDER_ID, 4242);
    harness.gateway.on_app_message(SESSION, &cancel).await.unwrap();
    assert_eq!(
        harness.exchange.commands().last(),
        Some(&OrderCommand::Cancel { order_id: 4242 })
    );

    harness
        .exchange
        .inject(notification(
            NotificationKind::OrderCancel,
            NotificationStatus::Error,
            "Order not found.",
            active_state(4242, 999, ""),
        ))
        .await;
    let reject = harness.next_message().await;
    assert_eq!(reject.msg_type, MsgType::OrderCancelReject);
    assert_eq!(reject.fields.get_opt(tags::ORDER_ID), Some("NONE"));
    assert_eq!(reject.fields.get_opt(tags::CXL_REJ_REASON), Some("1"));
    assert_eq!(reject.fields.get_opt(tags::TEXT), Some("Order not found."));
}

#[tokio::test]
async fn test_unresolvable_cancel_rejected_without_transport_call() {
    let mut harness = logged_on_harness().await;

    let mut cancel = FixMessage::new(MsgType::OrderCancelRequest);
    cancel
        .set(tags::CL_ORD_ID, "cxl-3")
        .set(tags::ORIG_CL_ORD_ID, "no-such-order");
    harness.gateway.on_app_message(SESSION, &cancel).await.unwrap();

    let reject = harness.next_message().await;
    assert_eq!(reject.msg_type, MsgType::OrderCancelReject);
    assert_eq!(reject.fields.get_opt(tags::ORDER_ID), Some("NONE"));
    assert_eq!(reject.fields.get_opt(tags::CXL_REJ_REASON), Some("1"));
    assert!(harness.exchange.commands().is_empty());
}

#[tokio::test]
async fn test_order_validation_synthesizes_local_reject() {
    let mut harness = logged_on_harness().await;

    // Limit order without a price never reaches the exchange.
    let mut message = FixMessage::new(MsgType::NewOrderSingle);
    message
        .set(tags::CL_ORD_ID, "557")
        .set(tags::SYMBOL, "tBTCUSD")
        .set(tags::SIDE, '1')
        .set(tags::ORD_TYPE, '2')
        .set(tags::ORDER_QTY, dec!(1));
    harness.gateway.on_app_message(SESSION, &message).await.unwrap();

    let reject = harness.next_message().await;
    assert_eq!(reject.msg_type, MsgType::ExecutionReport);
    assert_eq!(reject.fields.get_char(tags::EXEC_TYPE).unwrap(), '8');
    assert_eq!(reject.fields.get_opt(tags::ORDER_ID), Some("NONE"));
    assert!(harness.exchange.commands().is_empty());
}

#[tokio::test]
async fn test_fill_for_unknown_order_recovers_via_query() {
    let mut harness = logged_on_harness().await;
    *harness.exchange.query_status.lock().unwrap() = Some(active_state(808, 600, "ACTIVE"));

    harness
        .exchange
        .inject(ExchangeEvent::TradeExecution(TradeFill {
            exec_id: 1,
            order_id: 808,
            symbol: "tBTCUSD".to_string(),
            exec_price: dec!(11000),
            exec_amount: dec!(1),
            fee: None,
            fee_currency: None,
            cid: Some(600),
        }))
        .await;

    let report = harness.next_message().await;
    assert_eq!(report.fields.get_opt(tags::CL_ORD_ID), Some("600"));
    assert_eq!(report.fields.get_char(tags::EXEC_TYPE).unwrap(), '2');
    assert_eq!(report.fields.get_char(tags::ORD_STATUS).unwrap(), '2');
    assert_eq!(report.fields.get_decimal(tags::CUM_QTY).unwrap(), dec!(1));
}

#[tokio::test]
async fn test_order_snapshot_repopulates_cache_with_fill_history() {
    let mut harness = logged_on_harness().await;
    harness.exchange.trade_history.lock().unwrap().push(TradeFill {
        exec_id: 5,
        order_id: 909,
        symbol: "tBTCUSD".to_string(),
        exec_price: dec!(12000),
        exec_amount: dec!(0.4),
        fee: None,
        fee_currency: None,
        cid: Some(700),
    });

    harness
        .exchange
        .inject(ExchangeEvent::OrderSnapshot(vec![active_state(
            909, 700, "ACTIVE",
        )]))
        .await;
    // Fence: the snapshot is processed once the next event's report lands.
    harness
        .exchange
        .inject(ExchangeEvent::PositionUpdate(
            iris_gateway::messages::exchange::PositionState {
                symbol: "tBTCUSD".to_string(),
                amount: dec!(1),
                base_price: dec!(12000),
            },
        ))
        .await;
    assert_eq!(harness.next_message().await.msg_type, MsgType::PositionReport);

    // Snapshot emits no reports; a status request reads the rebuilt state.
    let mut status = FixMessage::new(MsgType::OrderStatusRequest);
    status.set(tags::CL_ORD_ID, "700");
    harness.gateway.on_app_message(SESSION, &status).await.unwrap();
    let report = harness.next_message().await;
    assert_eq!(report.fields.get_char(tags::EXEC_TYPE).unwrap(), 'I');
    assert_eq!(report.fields.get_char(tags::ORD_STATUS).unwrap(), '1');
    assert_eq!(report.fields.get_decimal(tags::CUM_QTY).unwrap(), dec!(0.4));
    assert_eq!(report.fields.get_opt(tags::ORDER_ID), Some("909"));
}

#[tokio::test]
async fn test_order_status_request_reads_cache() {
    let mut harness = logged_on_harness().await;
    harness
        .gateway
        .on_app_message(SESSION, &new_order_single("558", dec!(2), dec!(100)))
        .await
        .unwrap();

    let mut status = FixMessage::new(MsgType::OrderStatusRequest);
    status.set(tags::CL_ORD_ID, "558");
    harness.gateway.on_app_message(SESSION, &status).await.unwrap();
    let report = harness.next_message().await;
    assert_eq!(report.fields.get_char(tags::EXEC_TYPE).unwrap(), 'I');
    assert_eq!(report.fields.get_char(tags::ORD_STATUS).unwrap(), '0');
    assert_eq!(report.fields.get_decimal(tags::ORDER_QTY).unwrap(), dec!(2));

    let mut unknown = FixMessage::new(MsgType::OrderStatusRequest);
    unknown.set(tags::CL_ORD_ID, "never-seen");
    harness.gateway.on_app_message(SESSION, &unknown).await.unwrap();
    let report = harness.next_message().await;
    assert_eq!(report.fields.get_char(tags::EXEC_TYPE).unwrap(), 'I');
    assert_eq!(report.fields.get_char(tags::ORD_STATUS).unwrap(), '8');
}

#[tokio::test]
async fn test_logon_without_credentials_forces_logout() {
    let exchange = Arc::new(MockExchange::default());
    let sink = Arc::new(RecordingSink::default());
    let factory: HandleFactory = {
        let exchange = Arc::clone(&exchange);
        Box::new(move |_session_id: &str| ExchangeHandles {
            client: Arc::clone(&exchange) as Arc<dyn ExchangeClient>,
            query: Arc::clone(&exchange) as Arc<dyn ExchangeQuery>,
        })
    };
    let (gateway, _events) = Gateway::new(
        factory,
        Arc::clone(&sink) as Arc<dyn FixSink>,
        Arc::new(PassthroughSymbology),
        Arc::new(SequenceNonce::starting_at(1)),
        GatewayConfig::default(),
    );
    gateway.on_session_created("s1");

    let mut logon = FixMessage::new(MsgType::Logon);
    logon.set(custom_tags::API_KEY, "key-only");
    gateway.on_logon("s1", &logon).await;

    let (session, message) = sink.get(0).expect("expected a Logout");
    assert_eq!(session, "s1");
    assert_eq!(message.msg_type, MsgType::Logout);
}

fn md_request(req_id: &str, sub_type: char, symbol: &str) -> FixMessage {
    let mut message = FixMessage::new(MsgType::MarketDataRequest);
    message
        .set(tags::MD_REQ_ID, req_id)
        .set(tags::SUBSCRIPTION_REQUEST_TYPE, sub_type)
        .set(tags::SYMBOL, symbol)
        .set(tags::MARKET_DEPTH, 25);
    message
}

#[tokio::test]
async fn test_market_data_snapshot_request() {
    let mut harness = logged_on_harness().await;
    *harness.exchange.book.lock().unwrap() = vec![
        BookLevel {
            price: dec!(30000),
            count: 2,
            amount: dec!(1.5),
        },
        BookLevel {
            price: dec!(30010),
            count: 1,
            amount: dec!(-0.7),
        },
    ];

    harness
        .gateway
        .on_app_message(SESSION, &md_request("snap-1", '0', "tBTCUSD"))
        .await
        .unwrap();

    let snapshot = harness.next_message().await;
    assert_eq!(snapshot.msg_type, MsgType::MarketDataSnapshotFullRefresh);
    assert_eq!(snapshot.fields.get_opt(tags::MD_REQ_ID), Some("snap-1"));
    assert_eq!(snapshot.groups.len(), 2);
    assert_eq!(snapshot.groups[0].get_char(tags::MD_ENTRY_TYPE).unwrap(), '0');
    assert_eq!(snapshot.groups[1].get_char(tags::MD_ENTRY_TYPE).unwrap(), '1');
    assert_eq!(
        snapshot.groups[1].get_decimal(tags::MD_ENTRY_SIZE).unwrap(),
        dec!(0.7)
    );
    // Pure snapshot retains no subscription.
    assert!(harness.exchange.subscribe_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_symbol_subscription_rejected() {
    let mut harness = logged_on_harness().await;

    harness
        .gateway
        .on_app_message(SESSION, &md_request("req-1", '1', "tBTCUSD"))
        .await
        .unwrap();
    assert_eq!(harness.exchange.subscribe_requests.lock().unwrap().len(), 2);

    // Same symbol under a new request id: rejected, first stays live.
    harness
        .gateway
        .on_app_message(SESSION, &md_request("req-2", '1', "tBTCUSD"))
        .await
        .unwrap();
    let reject = harness.next_message().await;
    assert_eq!(reject.msg_type, MsgType::MarketDataRequestReject);
    assert_eq!(reject.fields.get_opt(tags::MD_REQ_ID), Some("req-2"));
    assert_eq!(reject.fields.get_char(tags::MD_REQ_REJ_REASON).unwrap(), '1');

    let peer = harness.gateway.find_peer(SESSION).unwrap();
    assert!(peer.subscriptions().lookup_subscription_ids("req-1").is_some());
    assert!(peer.subscriptions().lookup_subscription_ids("req-2").is_none());

    // Duplicate request id, different symbol: also rejected.
    harness
        .gateway
        .on_app_message(SESSION, &md_request("req-1", '1', "tETHUSD"))
        .await
        .unwrap();
    let reject = harness.next_message().await;
    assert_eq!(reject.fields.get_char(tags::MD_REQ_REJ_REASON).unwrap(), '1');
}

#[tokio::test]
async fn test_snapshot_reusing_live_request_id_rejected() {
    let mut harness = logged_on_harness().await;
    *harness.exchange.book.lock().unwrap() = vec![BookLevel {
        price: dec!(30000),
        count: 1,
        amount: dec!(1),
    }];

    harness
        .gateway
        .on_app_message(SESSION, &md_request("req-1", '1', "tBTCUSD"))
        .await
        .unwrap();

    // A one-shot snapshot reusing the live MDReqID is a duplicate, not a
    // refresh.
    harness
        .gateway
        .on_app_message(SESSION, &md_request("req-1", '0', "tETHUSD"))
        .await
        .unwrap();
    let reject = harness.next_message().await;
    assert_eq!(reject.msg_type, MsgType::MarketDataRequestReject);
    assert_eq!(reject.fields.get_opt(tags::MD_REQ_ID), Some("req-1"));
    assert_eq!(reject.fields.get_char(tags::MD_REQ_REJ_REASON).unwrap(), '1');

    let peer = harness.gateway.find_peer(SESSION).unwrap();
    assert!(peer.subscriptions().lookup_subscription_ids("req-1").is_some());
}

#[tokio::test]
async fn test_market_data_stream_and_unsubscribe() {
    let mut harness = logged_on_harness().await;
    harness
        .gateway
        .on_app_message(SESSION, &md_request("req-1", '1', "tBTCUSD"))
        .await
        .unwrap();

    // Incremental update: deletes omit the size field.
    harness
        .exchange
        .inject(ExchangeEvent::BookUpdate {
            sub_id: 1,
            symbol: "tBTCUSD".to_string(),
            level: BookLevel {
                price: dec!(30000),
                count: 0,
                amount: dec!(1),
            },
        })
        .await;
    let update = harness.next_message().await;
    assert_eq!(update.msg_type, MsgType::MarketDataIncrementalRefresh);
    assert_eq!(update.fields.get_opt(tags::MD_REQ_ID), Some("req-1"));
    assert_eq!(
        update.groups[0].get_char(tags::MD_UPDATE_ACTION).unwrap(),
        '2'
    );
    assert!(!update.groups[0].has(tags::MD_ENTRY_SIZE));

    // Public trade relays as a trade entry.
    harness
        .exchange
        .inject(ExchangeEvent::Trade {
            sub_id: 2,
            symbol: "tBTCUSD".to_string(),
            trade: iris_gateway::messages::exchange::PublicTrade {
                trade_id: 31337,
                price: dec!(30005),
                amount: dec!(-0.25),
            },
        })
        .await;
    let trade = harness.next_message().await;
    assert_eq!(trade.groups[0].get_char(tags::MD_ENTRY_TYPE).unwrap(), '2');
    assert_eq!(
        trade.groups[0].get_decimal(tags::MD_ENTRY_SIZE).unwrap(),
        dec!(0.25)
    );

    // Disable closes both underlying subscriptions and forgets the mapping.
    harness
        .gateway
        .on_app_message(SESSION, &md_request("req-1", '2', "tBTCUSD"))
        .await
        .unwrap();
    assert_eq!(*harness.exchange.unsubscribed.lock().unwrap(), vec![1, 2]);

    harness
        .gateway
        .on_app_message(SESSION, &md_request("req-1", '2', "tBTCUSD"))
        .await
        .unwrap();
    let reject = harness.next_message().await;
    assert_eq!(reject.msg_type, MsgType::MarketDataRequestReject);
    assert_eq!(
        reject.fields.get_opt(tags::TEXT),
        Some("could not find subscription")
    );
}
