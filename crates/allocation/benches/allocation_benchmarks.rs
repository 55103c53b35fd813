use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use stockflow_allocation::App;
use stockflow_catalog::{ProductId, WarehouseId};
use stockflow_core::UserId;

/// Seed an app with one product spread thinly over `warehouses` warehouses,
/// so every confirmation exercises the cross-warehouse pass.
fn setup(warehouses: usize, per_warehouse: i64) -> (App, ProductId, WarehouseId) {
    stockflow_observability::init();
    let app = App::in_memory();
    let product = app.register_product("SKU-BENCH", "Bench Widget").unwrap();
    app.register_supplier("Bench Supply").unwrap();

    let mut home = None;
    for i in 0..warehouses {
        let warehouse = app.register_warehouse(&format!("W{i}")).unwrap();
        app.open_record(warehouse, product, per_warehouse).unwrap();
        home.get_or_insert(warehouse);
    }

    (app, product, home.expect("at least one warehouse"))
}

fn bench_confirmation_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("confirmation_latency");

    for warehouses in [1usize, 4, 16] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(warehouses),
            &warehouses,
            |b, &warehouses| {
                // Plenty of stock so repeated confirmations never replenish.
                let (app, product, home) = setup(warehouses, 1_000_000);
                b.iter(|| {
                    let order = app
                        .create_sales_order(
                            UserId::new(),
                            home,
                            &[(product, warehouses as i64, 100)],
                        )
                        .unwrap();
                    black_box(app.confirm_sales_order(order).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_replenishment_path(c: &mut Criterion) {
    c.bench_function("confirmation_with_replenishment", |b| {
        let (app, product, home) = setup(1, 0);
        b.iter(|| {
            let order = app
                .create_sales_order(UserId::new(), home, &[(product, 5, 100)])
                .unwrap();
            black_box(app.confirm_sales_order(order).unwrap());
        });
    });
}

fn bench_availability_scan(c: &mut Criterion) {
    c.bench_function("available_across_warehouses_16", |b| {
        let (app, product, _) = setup(16, 50);
        b.iter(|| black_box(app.available_across_warehouses(product).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_confirmation_latency,
    bench_replenishment_path,
    bench_availability_scan
);
criterion_main!(benches);
