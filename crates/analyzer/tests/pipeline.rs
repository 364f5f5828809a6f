//! Pipeline tests against an instrumented in-memory provider.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_analyzer::{scan_blocks, BatchClassifier, CancelPolicy, ClassifierConfig};
use tally_core::{erc20_selectors, Block, Contract, TallyError, TallyResult, Transaction};
use tally_provider::BlockDataProvider;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Code {
    Erc20,
    Other,
    Empty,
    Fail,
    Hang,
}

/// Provider that records how many fetches are in flight at once.
struct MockProvider {
    code: HashMap<Address, Code>,
    delay: Duration,
    /// Per-address overrides of `delay`.
    delays: HashMap<Address, Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    fn new(code: HashMap<Address, Code>, delay: Duration) -> Arc<Self> {
        Self::with_delays(code, delay, HashMap::new())
    }

    fn with_delays(
        code: HashMap<Address, Code>,
        delay: Duration,
        delays: HashMap<Address, Duration>,
    ) -> Arc<Self> {
        Arc::new(Self {
            code,
            delay,
            delays,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight gauge even when the fetch future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlockDataProvider for MockProvider {
    async fn fetch_contract_code(&self, address: Address) -> TallyResult<Contract> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let code = self.code.get(&address).cloned().unwrap_or(Code::Empty);
        match code {
            Code::Hang => tokio::time::sleep(Duration::from_secs(30)).await,
            _ => {
                let delay = self.delays.get(&address).copied().unwrap_or(self.delay);
                tokio::time::sleep(delay).await
            }
        }

        match code {
            Code::Erc20 => Ok(Contract {
                address,
                bytecode: erc20_bytecode(),
            }),
            Code::Other => Ok(Contract {
                address,
                bytecode: "6080604052348015600f57600080fd5b50".into(),
            }),
            Code::Empty | Code::Hang => Ok(Contract {
                address,
                bytecode: String::new(),
            }),
            Code::Fail => Err(TallyError::Network("connection reset".into())),
        }
    }

    async fn fetch_recent_blocks(&self, _count: usize) -> TallyResult<Vec<Block>> {
        Ok(Vec::new())
    }

    async fn latest_block_number(&self) -> TallyResult<u64> {
        Ok(0)
    }
}

fn erc20_bytecode() -> String {
    let mut code = String::from("6080604052");
    for sel in erc20_selectors().selectors() {
        code.push_str("63");
        code.push_str(sel);
        code.push_str("14");
    }
    code
}

fn addr(i: u8) -> Address {
    Address::repeat_byte(i)
}

fn tx(n: u64, from: Address, to: Option<Address>) -> Transaction {
    Transaction {
        hash: B256::from(U256::from(n)),
        from,
        to,
        input: Bytes::new(),
        value: U256::ZERO,
        gas: 60_000,
    }
}

fn classifier(provider: Arc<MockProvider>, config: ClassifierConfig) -> BatchClassifier {
    BatchClassifier::new(provider, config).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_batch_schedules_nothing() {
    let provider = MockProvider::new(HashMap::new(), Duration::ZERO);
    let c = classifier(provider.clone(), ClassifierConfig::default());

    let outcome = c
        .classify_batch(&CancellationToken::new(), &[])
        .await
        .unwrap();

    assert!(outcome.matched.is_empty());
    assert_eq!(outcome.stats.contracts, 0);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_fetches_never_exceed_cap() {
    for cap in [1usize, 2, 3] {
        let code: HashMap<Address, Code> = (1..=12).map(|i| (addr(i), Code::Erc20)).collect();
        let provider = MockProvider::new(code, Duration::from_millis(20));
        let c = classifier(
            provider.clone(),
            ClassifierConfig::default().with_concurrency(cap),
        );

        let txs: Vec<Transaction> = (1..=12u8)
            .map(|i| tx(i as u64, addr(0xf0), Some(addr(i))))
            .collect();
        let outcome = c
            .classify_batch(&CancellationToken::new(), &txs)
            .await
            .unwrap();

        assert_eq!(outcome.matched.len(), 12);
        assert_eq!(provider.calls(), 12);
        assert!(
            provider.max_in_flight() <= cap,
            "cap {cap} exceeded: {}",
            provider.max_in_flight()
        );
        assert_eq!(provider.max_in_flight(), cap);
        assert_eq!(provider.in_flight(), 0);
    }
}

#[tokio::test]
async fn one_failing_fetch_does_not_sink_the_batch() {
    let mut code: HashMap<Address, Code> = (1..=5).map(|i| (addr(i), Code::Erc20)).collect();
    code.insert(addr(3), Code::Fail);
    let provider = MockProvider::new(code, Duration::from_millis(5));
    let c = classifier(provider, ClassifierConfig::default());

    let txs: Vec<Transaction> = (1..=5u8)
        .map(|i| tx(i as u64, addr(0xf0), Some(addr(i))))
        .collect();
    let outcome = c
        .classify_batch(&CancellationToken::new(), &txs)
        .await
        .unwrap();

    let mut hashes: Vec<B256> = outcome.matched.iter().map(|t| t.hash).collect();
    hashes.sort();
    let expected: Vec<B256> = [1u64, 2, 4, 5]
        .iter()
        .map(|n| B256::from(U256::from(*n)))
        .collect();
    assert_eq!(hashes, expected);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.matched, 4);
    assert!(!outcome.stats.cancelled);
}

#[tokio::test]
async fn failed_fetch_drops_every_tx_to_that_recipient() {
    let code = HashMap::from([(addr(1), Code::Erc20), (addr(2), Code::Fail)]);
    let provider = MockProvider::new(code, Duration::from_millis(1));
    let c = classifier(provider.clone(), ClassifierConfig::default());

    let txs = vec![
        tx(1, addr(0xf0), Some(addr(2))),
        tx(2, addr(0xf1), Some(addr(1))),
        tx(3, addr(0xf2), Some(addr(2))),
    ];
    let outcome = c
        .classify_batch(&CancellationToken::new(), &txs)
        .await
        .unwrap();

    let hashes: Vec<B256> = outcome.matched.iter().map(|t| t.hash).collect();
    assert_eq!(hashes, vec![txs[1].hash]);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.contracts, 2);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn drops_eoas_non_tokens_and_creations() {
    let code = HashMap::from([
        (addr(1), Code::Erc20),
        (addr(2), Code::Other),
        (addr(3), Code::Empty),
    ]);
    let provider = MockProvider::new(code, Duration::from_millis(1));
    let c = classifier(provider.clone(), ClassifierConfig::default());

    let txs = vec![
        tx(1, addr(0xf0), Some(addr(1))),
        tx(2, addr(0xf0), Some(addr(2))),
        tx(3, addr(0xf0), Some(addr(3))),
        tx(4, addr(0xf0), None),
    ];
    let outcome = c
        .classify_batch(&CancellationToken::new(), &txs)
        .await
        .unwrap();

    assert_eq!(outcome.matched, vec![txs[0].clone()]);
    assert_eq!(outcome.stats.transactions, 4);
    assert_eq!(outcome.stats.skipped, 1);
    assert_eq!(outcome.stats.contracts, 3);
    assert_eq!(outcome.stats.matched, 1);
    assert_eq!(outcome.stats.mismatched, 1);
    assert_eq!(outcome.stats.empty, 1);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn shared_recipient_is_fetched_once() {
    let code = HashMap::from([(addr(1), Code::Erc20)]);
    let provider = MockProvider::new(code, Duration::from_millis(1));
    let c = classifier(provider.clone(), ClassifierConfig::default());

    let txs: Vec<Transaction> = (0..6u8)
        .map(|i| tx(i as u64, addr(0x10 + i), Some(addr(1))))
        .collect();
    let outcome = c
        .classify_batch(&CancellationToken::new(), &txs)
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(outcome.matched.len(), 6);
}

#[tokio::test]
async fn slow_fetch_times_out_and_is_dropped() {
    let code = HashMap::from([(addr(1), Code::Erc20), (addr(2), Code::Hang)]);
    let provider = MockProvider::new(code, Duration::from_millis(1));
    let c = classifier(
        provider.clone(),
        ClassifierConfig::default().with_fetch_timeout(Duration::from_millis(50)),
    );

    let txs = vec![
        tx(1, addr(0xf0), Some(addr(1))),
        tx(2, addr(0xf0), Some(addr(2))),
    ];
    let started = Instant::now();
    let outcome = c
        .classify_batch(&CancellationToken::new(), &txs)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome.matched, vec![txs[0].clone()]);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(provider.in_flight(), 0);
}

#[tokio::test]
async fn cancellation_returns_partial_results() {
    let code = HashMap::from([
        (addr(1), Code::Erc20),
        (addr(2), Code::Hang),
        (addr(3), Code::Hang),
    ]);
    let provider = MockProvider::new(code, Duration::from_millis(1));
    let c = classifier(
        provider.clone(),
        ClassifierConfig::default().with_concurrency(3),
    );

    let txs = vec![
        tx(1, addr(0xf0), Some(addr(1))),
        tx(2, addr(0xf0), Some(addr(2))),
        tx(3, addr(0xf0), Some(addr(3))),
    ];

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = c.classify_batch(&cancel, &txs).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(outcome.stats.cancelled);
    assert_eq!(outcome.matched, vec![txs[0].clone()]);
    assert_eq!(outcome.stats.abandoned, 2);
    // Hung fetches were dropped, not leaked.
    assert_eq!(provider.in_flight(), 0);
}

#[tokio::test]
async fn strict_policy_fails_cancelled_batch() {
    let code = HashMap::from([(addr(1), Code::Hang)]);
    let provider = MockProvider::new(code, Duration::ZERO);
    let c = classifier(
        provider,
        ClassifierConfig::default().with_cancel_policy(CancelPolicy::Fail),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = c
        .classify_batch(&cancel, &[tx(1, addr(0xf0), Some(addr(1)))])
        .await
        .unwrap_err();
    assert!(matches!(err, TallyError::Cancelled));
}

#[tokio::test]
async fn cancelled_before_start_fetches_nothing() {
    let code: HashMap<Address, Code> = (1..=4).map(|i| (addr(i), Code::Erc20)).collect();
    let provider = MockProvider::new(code, Duration::from_millis(1));
    let c = classifier(provider.clone(), ClassifierConfig::default());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let txs: Vec<Transaction> = (1..=4u8)
        .map(|i| tx(i as u64, addr(0xf0), Some(addr(i))))
        .collect();
    let outcome = c.classify_batch(&cancel, &txs).await.unwrap();

    assert!(outcome.matched.is_empty());
    assert_eq!(outcome.stats.abandoned, 4);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn scan_counts_in_block_order() {
    let (a, b, c) = (addr(0xa), addr(0xb), addr(0xc));
    // Token contracts.
    let (t1, t2) = (addr(1), addr(2));
    let code = HashMap::from([(t1, Code::Erc20), (t2, Code::Erc20), (c, Code::Empty)]);
    let provider = MockProvider::new(code, Duration::from_millis(2));
    let classifier = classifier(provider, ClassifierConfig::default());

    let blocks = vec![
        Block {
            number: 101,
            hash: B256::repeat_byte(1),
            transactions: vec![tx(1, a, Some(t1)), tx(2, b, Some(c)), tx(3, b, Some(t2))],
        },
        Block {
            number: 100,
            hash: B256::repeat_byte(2),
            transactions: vec![tx(4, a, Some(t2)), tx(5, c, None)],
        },
    ];

    let scan = scan_blocks(&classifier, &CancellationToken::new(), &blocks)
        .await
        .unwrap();

    assert_eq!(scan.blocks_scanned, 2);
    assert_eq!(scan.erc20_txs, 3);
    assert_eq!(scan.newest_block, Some(101));
    assert_eq!(scan.oldest_block, Some(100));
    assert_eq!(scan.stats.transactions, 5);
    assert_eq!(scan.stats.skipped, 1);

    // Seen order: a, t1, b, t2, a, t2. Counts: a=2, t2=2, t1=1, b=1.
    let ranked: Vec<(Address, u64)> = scan
        .counter
        .top_k(10)
        .iter()
        .map(|r| (r.address, r.activity_count))
        .collect();
    assert_eq!(ranked, vec![(a, 2), (t2, 2), (t1, 1), (b, 1)]);
}

#[tokio::test]
async fn scan_ranking_ignores_completion_order() {
    let (a, b, c) = (addr(0xa), addr(0xb), addr(0xc));
    let (t1, t2, t3) = (addr(1), addr(2), addr(3));
    let code = HashMap::from([(t1, Code::Erc20), (t2, Code::Erc20), (t3, Code::Erc20)]);
    // First-seen recipient answers last.
    let delays = HashMap::from([
        (t1, Duration::from_millis(150)),
        (t2, Duration::from_millis(75)),
        (t3, Duration::from_millis(1)),
    ]);
    let provider = MockProvider::with_delays(code, Duration::from_millis(1), delays);
    let classifier = classifier(
        provider,
        ClassifierConfig::default().with_concurrency(3),
    );

    let txs = vec![tx(1, a, Some(t1)), tx(2, b, Some(t2)), tx(3, c, Some(t3))];

    // The pipeline hands matches back in completion order.
    let batch = classifier
        .classify_batch(&CancellationToken::new(), &txs)
        .await
        .unwrap();
    let arrival: Vec<B256> = batch.matched.iter().map(|t| t.hash).collect();
    assert_eq!(arrival, vec![txs[2].hash, txs[1].hash, txs[0].hash]);

    let blocks = vec![Block {
        number: 7,
        hash: B256::repeat_byte(7),
        transactions: txs,
    }];
    let scan = scan_blocks(&classifier, &CancellationToken::new(), &blocks)
        .await
        .unwrap();

    // All counts tie at 1, so the ranking is pure first-seen order.
    let ranked: Vec<Address> = scan.counter.top_k(6).iter().map(|r| r.address).collect();
    assert_eq!(ranked, vec![a, t1, b, t2, c, t3]);
}

#[tokio::test]
async fn strict_scan_fails_when_cancelled_between_batches() {
    let code = HashMap::from([(addr(1), Code::Erc20)]);
    let provider = MockProvider::new(code, Duration::from_millis(1));
    let strict = classifier(
        provider.clone(),
        ClassifierConfig::default().with_cancel_policy(CancelPolicy::Fail),
    );
    let lenient = classifier(provider.clone(), ClassifierConfig::default());

    let blocks = vec![Block {
        number: 1,
        hash: B256::repeat_byte(1),
        transactions: vec![tx(1, addr(0xf0), Some(addr(1)))],
    }];
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = scan_blocks(&strict, &cancel, &blocks).await.unwrap_err();
    assert!(matches!(err, TallyError::Cancelled));

    let partial = scan_blocks(&lenient, &cancel, &blocks).await.unwrap();
    assert!(partial.stats.cancelled);
    assert_eq!(partial.blocks_scanned, 0);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn classify_single_address() {
    let code = HashMap::from([(addr(1), Code::Erc20), (addr(2), Code::Other)]);
    let provider = MockProvider::new(code, Duration::ZERO);
    let c = classifier(provider, ClassifierConfig::default());

    let token = c.classify_address(addr(1)).await.unwrap();
    assert!(token.compatible);
    assert!(token.missing.is_empty());

    let other = c.classify_address(addr(2)).await.unwrap();
    assert!(!other.compatible);
    assert_eq!(other.missing.len(), 8);

    let eoa = c.classify_address(addr(9)).await.unwrap();
    assert!(!eoa.compatible);
    assert!(!eoa.contract.has_code());
}
