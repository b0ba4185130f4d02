// Escrow lifecycle benchmarks for the realty contracts.
//
// Covers listing, a complete sale from listing to finalize, and state
// serialization of a deployment with many settled listings.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use realty_contracts::{
    ether, Address, AssetRegistry, EscrowEngine, InMemoryLedger, Marketplace, RealEstate,
};

struct Parties {
    seller: Address,
    buyer: Address,
    inspector: Address,
    lender: Address,
}

fn parties() -> Parties {
    Parties {
        seller: Address::from_public_key(&[1; 32]),
        buyer: Address::from_public_key(&[2; 32]),
        inspector: Address::from_public_key(&[3; 32]),
        lender: Address::from_public_key(&[4; 32]),
    }
}

fn deploy(p: &Parties) -> Marketplace {
    let mut ledger = InMemoryLedger::new();
    ledger.airdrop(&p.buyer, ether(1_000_000)).unwrap();
    ledger.airdrop(&p.lender, ether(1_000_000)).unwrap();
    EscrowEngine::new(
        Address::contract(&p.seller, 1),
        p.seller,
        p.inspector,
        p.lender,
        RealEstate::new(Address::contract(&p.seller, 0)),
        ledger,
    )
}

fn run_sale(engine: &mut Marketplace, p: &Parties) {
    let escrow = engine.address();
    let id = engine
        .registry_mut()
        .mint(&p.seller, "ipfs://bench", None)
        .unwrap();
    engine
        .registry_mut()
        .approve(&p.seller, id, &escrow)
        .unwrap();
    engine.list(&p.seller, id, &p.buyer, ether(20), ether(10)).unwrap();
    engine.deposit_earnest(&p.buyer, id, ether(10)).unwrap();
    engine.update_inspection_status(&p.inspector, id, true).unwrap();
    engine.approve_sale(&p.buyer, id).unwrap();
    engine.approve_sale(&p.seller, id).unwrap();
    engine.approve_sale(&p.lender, id).unwrap();
    engine.fund_sale(&p.lender, id, ether(10)).unwrap();
    engine.finalize_sale(&p.seller, id).unwrap();
}

fn bench_full_sale(c: &mut Criterion) {
    let p = parties();
    c.bench_function("escrow/full_sale", |b| {
        b.iter_batched(
            || deploy(&p),
            |mut engine| run_sale(&mut engine, &p),
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_state_json(c: &mut Criterion) {
    let p = parties();
    let mut group = c.benchmark_group("escrow/state_json");

    for &sales in &[10usize, 100, 1_000] {
        let mut engine = deploy(&p);
        for _ in 0..sales {
            run_sale(&mut engine, &p);
        }
        group.throughput(Throughput::Elements(sales as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sales), &engine, |b, engine| {
            b.iter(|| serde_json::to_string(engine).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_full_sale, bench_state_json);
criterion_main!(benches);
