//! Property tests for counters, fees and the polling budget

use crate::context::Context;
use crate::estimate::Estimate;
use crate::operations::confirmation::tick_budget;
use crate::operations::params::TransferParams;
use crate::operations::prepare_operation;
use crate::test_utils::{MockRpc, MockSigner, MOCK_DESTINATION, MOCK_PK, MOCK_PKH};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_counters_follow_baseline(baseline in 0u64..1_000_000, count in 1usize..8, revealed in any::<bool>()) {
        let rpc = MockRpc::new();
        rpc.set_counter(MOCK_PKH, baseline);
        rpc.set_manager_key(MOCK_PKH, revealed.then_some(MOCK_PK));
        let ctx = Context::new(Arc::new(rpc)).with_signer(Arc::new(MockSigner::new()));
        let contents = (0..count)
            .map(|i| TransferParams::new(MOCK_DESTINATION, Decimal::from(i as u64 + 1)).to_content())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        let prepared = runtime()
            .block_on(prepare_operation(&ctx, contents, None))
            .unwrap();

        let counters: Vec<u64> = prepared
            .group
            .contents
            .iter()
            .map(|c| c.manager().unwrap().counter.parse().unwrap())
            .collect();
        let expected_len = count + usize::from(!revealed);
        prop_assert_eq!(counters.len(), expected_len);
        let expected: Vec<u64> = (1..=expected_len as u64).map(|i| baseline + i).collect();
        prop_assert_eq!(&counters, &expected);
        prop_assert_eq!(prepared.counter, baseline + expected_len as u64);
    }

    #[test]
    fn prop_fees_grow_with_usage(
        gas in 0u64..1_040_000,
        storage in 0u64..60_000,
        size in 0u64..32_768,
        extra_gas in 0u64..10_000,
        extra_size in 0u64..1_000,
    ) {
        let base = Estimate::new(gas, storage, size);
        let bigger = Estimate::new(gas + extra_gas, storage, size + extra_size);

        prop_assert!(base.suggested_fee_mutez() <= bigger.suggested_fee_mutez());
        prop_assert!(base.minimal_fee_mutez() <= bigger.minimal_fee_mutez());
        prop_assert!(base.minimal_fee_mutez() <= base.suggested_fee_mutez());
        prop_assert_eq!(base.gas_limit(), gas + 100);
        prop_assert_eq!(base.burn_fee_mutez(), storage * 1_000);
    }

    #[test]
    fn prop_tick_budget_covers_timeout(interval_ms in 1u64..60_000, timeout_ms in 1u64..600_000) {
        let interval = Duration::from_millis(interval_ms);
        let timeout = Duration::from_millis(timeout_ms);
        let budget = tick_budget(interval, timeout).unwrap();

        prop_assert!(budget >= 2);
        prop_assert!((budget - 1) * interval_ms >= timeout_ms);
        prop_assert!((budget - 2) * interval_ms < timeout_ms);
    }
}
