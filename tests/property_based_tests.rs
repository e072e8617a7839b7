mod common;

use common::strategies::*;
use common::{date, filter};
use proptest::prelude::*;
use sales_analytics::cache::CacheKeyBuilder;
use sales_analytics::config::ChunkingConfig;
use sales_analytics::{DateRangeChunker, DocType};

fn permuted(list: Vec<String>) -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
    (Just(list.clone()), Just(list).prop_shuffle())
}

proptest! {
    /// Property: list-valued dimensions never change a key by their order
    #[test]
    fn cache_keys_ignore_list_order(
        (salespeople, shuffled_salespeople) in code_list_strategy().prop_flat_map(permuted),
        (include, shuffled_include) in code_list_strategy().prop_flat_map(permuted),
        (exclude, shuffled_exclude) in code_list_strategy().prop_flat_map(permuted),
        store in proptest::option::of(code_strategy()),
    ) {
        let keys = CacheKeyBuilder::new("analytics");
        let base = filter(date(2024, 1, 1), date(2024, 1, 31));
        let with_store = |f: sales_analytics::QueryFilter| match &store {
            Some(store) => f.with_store(store.clone()),
            None => f,
        };

        let a = with_store(base.clone())
            .with_salespeople(salespeople)
            .including(include)
            .excluding(exclude);
        let b = with_store(base)
            .with_salespeople(shuffled_salespeople)
            .including(shuffled_include)
            .excluding(shuffled_exclude);

        prop_assert_eq!(
            keys.build("product", "MY", &a, DocType::REVENUE),
            keys.build("product", "MY", &b, DocType::REVENUE)
        );
    }

    /// Property: doc type order never changes a key either
    #[test]
    fn cache_keys_ignore_doc_type_order(swap in any::<bool>()) {
        let keys = CacheKeyBuilder::new("analytics");
        let f = filter(date(2024, 1, 1), date(2024, 1, 31));
        let docs = if swap {
            [DocType::CreditNote, DocType::TaxInvoice]
        } else {
            [DocType::TaxInvoice, DocType::CreditNote]
        };
        prop_assert_eq!(
            keys.build("daily", "MY", &f, &docs),
            keys.build("daily", "MY", &f, DocType::REVENUE)
        );
    }

    /// Property: chunks of a wide range are contiguous and rebuild it exactly
    #[test]
    fn wide_ranges_split_without_gaps_or_overlaps((start, end) in date_range_strategy(800)) {
        let chunker = DateRangeChunker::new(ChunkingConfig::default());
        let chunks = chunker.chunks_for(start, end);
        let span = (end - start).num_days();

        if span > 60 {
            prop_assert!(chunks.len() > 1);
        } else {
            prop_assert_eq!(chunks.len(), 1);
        }

        prop_assert_eq!(chunks.first().unwrap().start, start);
        prop_assert_eq!(chunks.last().unwrap().end, end);
        for pair in chunks.windows(2) {
            prop_assert_eq!(pair[0].end.succ_opt().unwrap(), pair[1].start);
        }

        let covered: i64 = chunks.iter().map(|c| c.days()).sum();
        prop_assert_eq!(covered, span + 1);
        if span > 60 {
            prop_assert!(chunks.iter().all(|c| c.days() <= 30));
        }
    }
}
