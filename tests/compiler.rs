use autopipe::config::CatalogConfig;
use autopipe::engines::evaluation::compile_individual;
use autopipe::engines::generation::{parse_individual, Individual};
use autopipe::functions::{BuildContext, Catalog, ComponentRegistry, Estimator, FitContext};
use autopipe::{AutopipeError, Task};
use ndarray::{Array1, Array2};

fn classification_catalog(config: &CatalogConfig) -> Catalog {
    Catalog::from_registry(ComponentRegistry::new(), Task::Classification, config).unwrap()
}

fn ctx() -> BuildContext {
    BuildContext {
        task: Task::Classification,
        n_classes: 2,
        random_state: 42,
    }
}

fn two_blobs() -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((40, 3), |(i, j)| {
        let offset = if i < 20 { 0.0 } else { 4.0 };
        offset + ((i * 13 + j * 7) % 10) as f64 / 10.0
    });
    let y = Array1::from_shape_fn(40, |i| if i < 20 { 0.0 } else { 1.0 });
    (x, y)
}

#[test]
fn test_compiling_twice_gives_identical_predictions() {
    let catalog = classification_catalog(&CatalogConfig::default());
    let ind = parse_individual(
        "RandomForestClassifier(StandardScaler(data), RandomForestClassifier.n_estimators=100, \
         RandomForestClassifier.criterion='entropy', RandomForestClassifier.max_features=0.5, \
         RandomForestClassifier.min_samples_split=2, RandomForestClassifier.min_samples_leaf=1, \
         RandomForestClassifier.bootstrap=True)",
        &catalog,
    )
    .unwrap();
    let (x, y) = two_blobs();

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let mut pipeline = compile_individual(&ind, &catalog, &ctx()).unwrap();
        pipeline.fit(&x, &y, &FitContext::unbounded()).unwrap();
        outputs.push(pipeline.predict_output(&x).unwrap());
    }
    assert_eq!(outputs[0].dim(), (40, 2));
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn test_component_outside_catalog_is_compile_error() {
    let full = classification_catalog(&CatalogConfig::default());
    let ind = parse_individual("GaussianNB(MinMaxScaler(data))", &full).unwrap();

    let restricted = classification_catalog(&CatalogConfig {
        exclude: vec!["MinMaxScaler".to_string()],
        ..Default::default()
    });
    assert!(matches!(
        compile_individual(&ind, &restricted, &ctx()),
        Err(AutopipeError::Compile(_))
    ));
}

#[test]
fn test_value_outside_domain_is_compile_error() {
    let full = classification_catalog(&CatalogConfig::default());
    let ind = parse_individual("GaussianNB(Normalizer(data, Normalizer.norm='max'))", &full).unwrap();

    let mut config = CatalogConfig::default();
    config.params.insert(
        "Normalizer.norm".to_string(),
        vec![autopipe::types::Value::String("l1".to_string())],
    );
    let narrowed = classification_catalog(&config);
    assert!(matches!(
        compile_individual(&ind, &narrowed, &ctx()),
        Err(AutopipeError::Compile(_))
    ));
}

#[test]
fn test_malformed_trees_are_structural_errors() {
    let catalog = classification_catalog(&CatalogConfig::default());
    let ind = parse_individual("GaussianNB(Normalizer(data, Normalizer.norm='l2'))", &catalog).unwrap();

    // drop the terminal
    let truncated = Individual::new(ind.nodes()[..3].to_vec());
    assert!(matches!(
        compile_individual(&truncated, &catalog, &ctx()),
        Err(AutopipeError::Structural(_))
    ));

    // transformer at the root
    let headless = Individual::new(ind.nodes()[1..].to_vec());
    assert!(matches!(
        compile_individual(&headless, &catalog, &ctx()),
        Err(AutopipeError::Structural(_))
    ));
}

#[test]
fn test_incompatible_combination_fails_at_fit_not_compile() {
    let catalog = classification_catalog(&CatalogConfig::default());
    let ind = parse_individual(
        "GaussianNB(FeatureAgglomeration(data, FeatureAgglomeration.linkage='ward', \
         FeatureAgglomeration.affinity='cosine'))",
        &catalog,
    )
    .unwrap();
    let (x, y) = two_blobs();
    let mut pipeline = compile_individual(&ind, &catalog, &ctx()).unwrap();
    assert!(pipeline.fit(&x, &y, &FitContext::unbounded()).is_err());
}
