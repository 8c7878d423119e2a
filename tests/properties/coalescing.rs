//! Property tests for the single-slot rerun signal.

use proptest::prelude::*;

use rerun::signal;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: Any burst of requests leaves exactly one pending.
    #[test]
    fn property_burst_collapses_to_one(burst in 1usize..200) {
        let (tx, rx) = signal();
        let accepted = (0..burst).filter(|_| tx.notify()).count();
        prop_assert_eq!(accepted, 1);

        // Consuming the one request empties the slot again.
        prop_assert!(rx.wait());
        prop_assert!(tx.notify());
    }

    /// PROPERTY: Bursts separated by a consume each yield one request.
    #[test]
    fn property_bursts_between_consumes(bursts in proptest::collection::vec(1usize..20, 1..10)) {
        let (tx, rx) = signal();
        let mut consumed = 0;
        for burst in &bursts {
            let accepted = (0..*burst).filter(|_| tx.notify()).count();
            prop_assert_eq!(accepted, 1);
            if rx.wait() {
                consumed += 1;
            }
        }
        prop_assert_eq!(consumed, bursts.len());
    }
}
