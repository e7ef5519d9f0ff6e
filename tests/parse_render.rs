use autopipe::config::CatalogConfig;
use autopipe::engines::generation::operators::random_individual;
use autopipe::engines::generation::parse_individual;
use autopipe::functions::{Catalog, ComponentRegistry};
use autopipe::{AutopipeError, Task};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn catalog(task: Task) -> Catalog {
    Catalog::from_registry(ComponentRegistry::new(), task, &CatalogConfig::default()).unwrap()
}

#[test]
fn test_documented_pipeline_round_trips() {
    let source = "RandomForestClassifier(FeatureAgglomeration(data, \
        FeatureAgglomeration.linkage='complete', FeatureAgglomeration.affinity='l2'), \
        RandomForestClassifier.n_estimators=100, RandomForestClassifier.criterion='gini', \
        RandomForestClassifier.max_features=0.6, RandomForestClassifier.min_samples_split=6, \
        RandomForestClassifier.min_samples_leaf=7, RandomForestClassifier.bootstrap=True)";
    let ind = parse_individual(source, &catalog(Task::Classification)).unwrap();
    assert_eq!(ind.to_string(), source);
    assert_eq!(ind.canonical(), source);
}

#[test]
fn test_generated_pipelines_round_trip() {
    for task in [Task::Classification, Task::Regression] {
        let catalog = catalog(task);
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..200 {
            let ind = random_individual(&catalog, 3, &mut rng).unwrap();
            let rendered = ind.to_string();
            let parsed = parse_individual(&rendered, &catalog)
                .unwrap_or_else(|e| panic!("cannot parse {}: {}", rendered, e));
            assert_eq!(parsed, ind);
            assert_eq!(parsed.to_string(), rendered);
        }
    }
}

#[test]
fn test_small_float_values_round_trip() {
    let catalog = catalog(Task::Regression);
    let source = "RidgeRegression(VarianceThreshold(MinMaxScaler(data), VarianceThreshold.threshold=0.0001), \
        RidgeRegression.alpha=0.001)";
    let ind = parse_individual(source, &catalog).unwrap();
    assert_eq!(parse_individual(&ind.to_string(), &catalog).unwrap(), ind);
}

#[test]
fn test_rejects_unknown_names_and_values() {
    let catalog = catalog(Task::Regression);
    for source in [
        "Unknown(data)",
        "RidgeRegression(data, RidgeRegression.alpha=0.123)",
        "RidgeRegression(data)",
        "RidgeRegression(data, RidgeRegression.alpha=1.0",
        "GaussianNB(data)",
    ] {
        assert!(
            matches!(parse_individual(source, &catalog), Err(AutopipeError::Parse(_))),
            "{} should not parse",
            source
        );
    }
}
