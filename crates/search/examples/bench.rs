use std::sync::Arc;
use std::time::Instant;

use rxsearch_core::{DrugRecord, DrugbankId, Synonym};
use rxsearch_search::{PageRequest, SearchConfig, SearchEngine};
use rxsearch_store::{MemoryPartition, Partition, PartitionSet};

const STEMS: &[&str] = &["aspirin", "ibuprofen", "warfarin", "metformin", "amoxicillin", "lisinopril", "omeprazole", "atorvastatin"];

fn gen_record(i: usize) -> DrugRecord {
    let stem = STEMS[i % STEMS.len()];
    DrugRecord {
        name: format!("{stem} {i:06}"),
        synonyms: Some(vec![Synonym { name: Some(format!("syn-{stem}-{}", i % 97)), language: Some("english".into()) }]),
        drugbank_id: Some(std::iter::once(DrugbankId { id: format!("DB{i:07}"), primary: true }).collect()),
        drug_type: Some("small molecule".into()),
        unii: None,
    }
}

fn percentile_us(xs: &mut [u128], p: f64) -> u128 {
    xs.sort_unstable();
    let idx = ((xs.len() as f64 - 1.0) * p).round() as usize;
    xs[idx]
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let n: usize = std::env::var("RXS_BENCH_DOCS").ok().and_then(|s| s.parse().ok()).unwrap_or(100_000);
    let parts_n: usize = std::env::var("RXS_BENCH_PARTITIONS").ok().and_then(|s| s.parse().ok()).unwrap_or(3);

    eprintln!("building {} partitions x {} docs", parts_n, n);
    let t0 = Instant::now();
    let records: Vec<DrugRecord> = (0..n).map(gen_record).collect();
    let parts: Vec<Arc<dyn Partition>> = (0..parts_n)
        .map(|i| Arc::new(MemoryPartition::new(format!("p{i}"), records.clone())) as Arc<dyn Partition>)
        .collect();
    println!("build: {:.1}ms", t0.elapsed().as_secs_f64() * 1_000.0);

    let engine = SearchEngine::new(PartitionSet::new(parts)?, SearchConfig::from_env());
    let queries: Vec<String> = STEMS.iter().flat_map(|s| [s[..3].to_string(), s.to_string(), format!("{s} 00")]).collect();

    let mut search_us = Vec::with_capacity(queries.len());
    let mut auto_us = Vec::with_capacity(queries.len());
    for q in &queries {
        let t = Instant::now();
        let _ = engine.search(Some(q), PageRequest::new(None, None, engine.config())).await?;
        search_us.push(t.elapsed().as_micros());
        let t = Instant::now();
        let _ = engine.autocomplete(Some(q)).await?;
        auto_us.push(t.elapsed().as_micros());
    }
    for (label, xs) in [("search", &mut search_us), ("autocomplete", &mut auto_us)] {
        let p50 = percentile_us(&mut xs.clone(), 0.50) as f64 / 1000.0;
        let p99 = percentile_us(xs, 0.99) as f64 / 1000.0;
        println!("{}: p50={:.3}ms p99={:.3}ms ({} queries)", label, p50, p99, queries.len());
    }
    Ok(())
}
