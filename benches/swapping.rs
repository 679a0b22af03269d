use choicedesign::attributes::{Asc, Attribute, DesignLayoutBuilder};
use choicedesign::conditions::ConditionSet;
use choicedesign::generation::initial_design;
use choicedesign::model::MnlModel;
use choicedesign::{DesignCriterion, SwapOptions, SwapSearch};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn model() -> MnlModel {
    let attributes = vec![
        Attribute::numeric("price", vec![1.0, 2.0, 3.0, 4.0], -0.4),
        Attribute::numeric("time", vec![10.0, 20.0, 30.0], -0.05),
        Attribute::dummy("comfort", Attribute::levels(3), vec![0.3, 0.6]),
    ];
    let layout = DesignLayoutBuilder::new(attributes, 3)
        .optout(true)
        .asc(Asc::new(4, -1.0))
        .build()
        .expect("valid layout");
    MnlModel::new(layout)
}

fn bench_criterion(c: &mut Criterion) {
    let model = model();
    let mut rng = SmallRng::seed_from_u64(1);
    let levels = model.layout().column_levels();
    let design = initial_design(&levels, 24, &ConditionSet::default(), &mut rng).unwrap();

    c.bench_function("d_error_24x3", |b| {
        b.iter(|| model.score(black_box(&design)).unwrap())
    });
}

fn bench_swap_search(c: &mut Criterion) {
    let model = model();
    let conditions =
        ConditionSet::compile(&["alt1_price != alt2_price"], &model.layout().column_names())
            .unwrap();
    let mut rng = SmallRng::seed_from_u64(2);
    let levels = model.layout().column_levels();
    let design = initial_design(&levels, 24, &conditions, &mut rng).unwrap();
    let initial = model.score(&design).unwrap();
    let search = SwapSearch::new(
        &model,
        &conditions,
        SwapOptions::default().with_iteration_limit(500),
    );

    c.bench_function("swap_search_500", |b| {
        b.iter(|| {
            let mut rng = SmallRng::seed_from_u64(3);
            search.run(design.clone(), initial, &mut rng).unwrap()
        })
    });
}

criterion_group!(benches, bench_criterion, bench_swap_search);
criterion_main!(benches);
