//! # End-to-End Flows
//!
//! Each test runs two shards of four replicas and the supervisor until
//! the supervisor stops everyone, then inspects every replica's ledger.
//!
//! Default placement with two shards (last hex digits, mod 2):
//! `a0000000`, `a0000002` and `c0000004` live in shard 0,
//! `b0000001` and `b0000003` in shard 1.

#[cfg(test)]
mod tests {
    use crate::harness::{balances, owners, transfer, Cluster};
    use num_bigint::BigUint;
    use se_01_ledger::Ledger;
    use shared_types::{EmulatorConfig, StrategyKind};

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    /// Two shards of four replicas. The stop gap is long enough for a
    /// relayed transaction to reach its block before the run ends.
    fn config(strategy: StrategyKind) -> EmulatorConfig {
        let mut config = EmulatorConfig::for_testing();
        config.strategy = strategy;
        config.stop_threshold = 30;
        config
    }

    fn plus(config: &EmulatorConfig, value: u32) -> Option<BigUint> {
        Some(&config.init_balance + BigUint::from(value))
    }

    fn minus(config: &EmulatorConfig, value: u32) -> Option<BigUint> {
        Some(&config.init_balance - BigUint::from(value))
    }

    fn everywhere(expected: Option<BigUint>, nodes: u64) -> Vec<Option<BigUint>> {
        vec![expected; nodes as usize]
    }

    // =========================================================================
    // RELAY
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_relay_debits_sender_shard_and_credits_recipient_shard() {
        let config = config(StrategyKind::Relay);
        let nodes = config.nodes_per_shard;
        let cluster = Cluster::start(
            config.clone(),
            vec![
                transfer("a0000000", "b0000001", 10),
                transfer("b0000001", "b0000003", 3),
                transfer("a0000000", "a0000002", 2),
            ],
        );
        let (summary, ledgers) = cluster.finish().await;
        assert_eq!(summary.injected, 3);
        assert_eq!(summary.repartitions, 0);

        assert_eq!(balances(&ledgers, 0, "a0000000"), everywhere(minus(&config, 12), nodes));
        assert_eq!(balances(&ledgers, 0, "a0000002"), everywhere(plus(&config, 2), nodes));
        assert_eq!(balances(&ledgers, 1, "b0000001"), everywhere(plus(&config, 7), nodes));
        assert_eq!(balances(&ledgers, 1, "b0000003"), everywhere(plus(&config, 3), nodes));

        // Neither shard books the other side of the cross-shard transfer.
        assert_eq!(balances(&ledgers, 0, "b0000001"), everywhere(None, nodes));
        assert_eq!(balances(&ledgers, 1, "a0000000"), everywhere(None, nodes));
    }

    // =========================================================================
    // BROKER
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_broker_splits_cross_shard_transfer_in_two_hops() {
        let config = config(StrategyKind::Broker);
        let nodes = config.nodes_per_shard;
        let cluster = Cluster::start(config.clone(), vec![transfer("a0000000", "b0000001", 10)]);
        let (summary, ledgers) = cluster.finish().await;
        // Hop one at injection, hop two once shard 0 reported it.
        assert_eq!(summary.injected, 2);

        assert_eq!(balances(&ledgers, 0, "a0000000"), everywhere(minus(&config, 10), nodes));
        assert_eq!(balances(&ledgers, 1, "b0000001"), everywhere(plus(&config, 10), nodes));

        // The broker gained in shard 0 exactly what it paid in shard 1.
        let brokers = config.broker_addresses();
        for shard in 0..config.shard_num {
            for ledger in &ledgers[shard as usize] {
                let touched: Vec<BigUint> = brokers
                    .iter()
                    .filter_map(|broker| ledger.account(broker).map(|state| state.balance))
                    .collect();
                assert_eq!(touched.len(), 1);
                let expected = if shard == 0 { plus(&config, 10) } else { minus(&config, 10) };
                assert_eq!(touched.into_iter().next(), expected);
            }
        }
    }

    // =========================================================================
    // CLPA MIGRATION
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_clpa_moves_hot_account_with_its_state() {
        let mut config = config(StrategyKind::Clpa);
        config.clpa.frequency_ms = 200;
        config.stop_threshold = 60;
        let nodes = config.nodes_per_shard;

        // Three transfers tie a0000000 to shard 1 harder than to shard 0.
        let mut txs = vec![transfer("a0000000", "b0000001", 10); 3];
        txs.push(transfer("a0000002", "c0000004", 1));
        let cluster = Cluster::start(config.clone(), txs);
        let (summary, ledgers) = cluster.finish().await;
        assert_eq!(summary.injected, 4);
        assert_eq!(summary.repartitions, 1);

        for shard in 0..config.shard_num {
            assert_eq!(owners(&ledgers, shard, "a0000000"), vec![1; nodes as usize]);
            assert_eq!(owners(&ledgers, shard, "a0000002"), vec![0; nodes as usize]);
        }
        assert_eq!(balances(&ledgers, 1, "a0000000"), everywhere(minus(&config, 30), nodes));
        assert_eq!(balances(&ledgers, 1, "b0000001"), everywhere(plus(&config, 30), nodes));
        assert_eq!(balances(&ledgers, 0, "c0000004"), everywhere(plus(&config, 1), nodes));
    }
}
