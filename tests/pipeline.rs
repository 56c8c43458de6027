use std::fs;

use ndarray::{s, Array2, Array3};
use rusty_spoc::calculator::SELF_REDUCED;
use rusty_spoc::component::statistic::evaluate;
use rusty_spoc::component::{
    ComparisonAxis, Component, ComponentInfo, Instance, PairwiseMeasure, PairwiseStatistic,
    ParamSchema, Params, Reducer, Reduction, Statistic,
};
use rusty_spoc::error::{ComputeError, ComputeResult, ConfigError};
use rusty_spoc::registry::Namespace;
use rusty_spoc::{Calculator, Dataset, Resolver, Scheme, SchemeBuilder};

const BASIC: &str = r#"
Statistics:
  rusty_spoc.statistics.basic:
    Covariance:
      schemes:
        std: null
    PearsonR:
      schemes:
        sq:
          squared: true
  rusty_spoc.statistics.distance:
    PairwiseDistance:
      schemes:
        euclidean: null
Reducers:
  rusty_spoc.reducers.basic:
    Trace:
      schemes:
        default: null
    Diag:
      schemes:
        two:
          num_values: 2
      Statistics: rusty_spoc.statistics.basic.*
ReducedStatistics:
  rusty_spoc.rstatistics.basic:
    PcaVarianceExplainedRatio:
      schemes:
        first:
          components: 1
"#;

fn sample() -> Dataset {
    let data = Array2::from_shape_fn((30, 3), |(i, j)| {
        let t = i as f64;
        match j {
            0 => t.sin(),
            1 => 0.5 * t.sin() + 0.1 * t.cos(),
            _ => (0.7 * t).cos(),
        }
    });
    Dataset::new(data.into_dyn()).unwrap().with_name("sample")
}

#[test]
fn builtin_configuration_produces_a_full_table() {
    let scheme = Scheme::from_yaml_str("basic", BASIC).unwrap();
    let mut calc = Calculator::new(sample());
    let table = calc.compute(&scheme);

    let cov = "rusty_spoc.statistics.basic.Covariance.std";
    let pdist = "rusty_spoc.statistics.distance.PairwiseDistance.euclidean";
    let trace = "rusty_spoc.reducers.basic.Trace.default";
    let diag = "rusty_spoc.reducers.basic.Diag.two";

    assert!(table.get(cov, trace).unwrap() > 0.0);
    assert!(table.get(cov, &format!("{diag}_2")).is_some());
    // Diag is filtered to the basic statistics only.
    assert!(table.get(pdist, trace).is_some());
    assert!(table.get(pdist, &format!("{diag}_1")).is_none());

    let pca = "rusty_spoc.rstatistics.basic.PcaVarianceExplainedRatio.first";
    let ratio = table.get(pca, SELF_REDUCED).unwrap();
    assert!(ratio > 0.0 && ratio <= 1.0);
    assert!(calc.failures().is_empty());
}

#[test]
fn csv_export_keeps_configuration_order() {
    let scheme = Scheme::from_yaml_str("basic", BASIC).unwrap();
    let mut calc = Calculator::new(sample()).with_name("row-label");
    let table = calc.compute(&scheme);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.csv");
    table.export_csv(&path).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Statistic,rusty_spoc.statistics.basic.Covariance.std"));
    assert!(lines[1].starts_with("Reducer,rusty_spoc.reducers.basic.Trace.default"));
    assert!(lines[2].starts_with("row-label,"));
}

#[test]
fn missing_required_argument_fails_before_any_computation() {
    let text = BASIC.replace("          squared: true\n", "");
    let text = text.replace("        sq:\n", "        sq: null\n");
    match Scheme::from_yaml_str("broken", &text) {
        Err(ConfigError::MissingArguments { missing, .. }) => assert_eq!(missing, vec!["squared"]),
        other => panic!("expected MissingArguments, got {:?}", other.err()),
    }
}

#[test]
fn yaml_export_round_trips_through_a_file() {
    let scheme = Scheme::from_yaml_str("basic", BASIC).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exported.yaml");
    scheme.export_yaml(&path).unwrap();

    let rebuilt = Scheme::from_yaml_file("again", &path).unwrap();
    let names = |s: &Scheme| s.reducers().names().map(str::to_string).collect::<Vec<_>>();
    assert_eq!(names(&scheme), names(&rebuilt));
    let diag = "rusty_spoc.reducers.basic.Diag.two";
    assert_eq!(
        rebuilt.reducer_filter(diag).unwrap().matched(),
        scheme.reducer_filter(diag).unwrap().matched()
    );

    let json_path = dir.path().join("exported.json");
    scheme.export_json(&json_path).unwrap();
    let from_json = Scheme::from_json_file("json", &json_path).unwrap();
    assert_eq!(from_json.statistics().len(), scheme.statistics().len());
}

#[test]
fn manifest_module_derives_classes_with_new_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("derived.yaml");
    fs::write(
        &manifest,
        r#"
SquaredPearson:
  base: rusty_spoc.statistics.basic.PearsonR
  defaults:
    squared: true
ShrunkCovariance:
  base: rusty_spoc.statistics.basic.Covariance
  defaults:
    estimator: ShrunkCovariance
"#,
    )
    .unwrap();

    let module = manifest.display().to_string();
    let config = format!(
        r#"
Statistics:
  {module}:
    SquaredPearson:
      schemes:
        default: null
    ShrunkCovariance:
      schemes:
        default: null
Reducers:
  rusty_spoc.reducers.basic:
    Trace:
      schemes:
        default: null
"#
    );
    let scheme = Scheme::from_yaml_str("manifest", &config).unwrap();
    let pearson = scheme
        .statistics()
        .get(&format!("{module}.SquaredPearson.default"))
        .unwrap();
    assert_eq!(pearson.component().identifier(), "pearsonr.sq");

    let mut calc = Calculator::new(sample());
    let table = calc.compute(&scheme);
    let trace = table
        .get(&format!("{module}.SquaredPearson.default"), "rusty_spoc.reducers.basic.Trace.default")
        .unwrap();
    assert!((trace - 3.0).abs() < 1e-9);
}

#[test]
fn registered_manifest_is_found_by_lower_cased_name() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("extra.yaml");
    fs::write(
        &manifest,
        "Unsigned:\n  base: rusty_spoc.statistics.basic.KendallTau\n  \
         defaults:\n    squared: true\n",
    )
    .unwrap();

    let mut resolver = Resolver::default();
    resolver.register_manifest("Extra", &manifest).unwrap();
    let config = r#"
Statistics:
  extra:
    Unsigned:
      schemes:
        a: null
Reducers:
  rusty_spoc.reducers.basic:
    Mean:
      schemes:
        a: null
"#;
    let scheme = SchemeBuilder::new(&mut resolver).build_str("registered", config).unwrap();
    assert!(scheme.statistics().contains("extra.Unsigned.a"));
}

// ---------------------------------------------------------------------------
// Custom components through a runtime namespace
// ---------------------------------------------------------------------------

struct Failing(ComponentInfo);

impl Component for Failing {
    fn info(&self) -> &ComponentInfo {
        &self.0
    }
}

impl Statistic for Failing {
    fn compute(&self, _: ndarray::ArrayD<f64>) -> ComputeResult<ndarray::ArrayD<f64>> {
        Err(ComputeError::Numeric("always fails".into()))
    }
}

struct Sum(ComponentInfo);

impl Component for Sum {
    fn info(&self) -> &ComponentInfo {
        &self.0
    }
}

impl Reducer for Sum {
    fn compute(&self, data: ndarray::ArrayD<f64>) -> ComputeResult<Reduction> {
        Ok(Reduction::Scalar(data.sum()))
    }
}

fn custom_namespace() -> Namespace {
    Namespace::new("custom")
        .statistic("Failing", ParamSchema::new(), |_| {
            Ok(Box::new(Failing(ComponentInfo::new("Failing", "fail", &[]))))
        })
        .reducer("Sum", ParamSchema::new(), |_| {
            Ok(Box::new(Sum(ComponentInfo::new("Sum", "sum", &[]))))
        })
}

#[test]
fn failing_middle_statistic_has_no_columns() {
    let mut resolver = Resolver::default();
    resolver.register_namespace(custom_namespace());
    let config = r#"
Statistics:
  rusty_spoc.statistics.basic:
    Covariance:
      schemes:
        first: null
  custom:
    Failing:
      schemes:
        middle: null
  rusty_spoc.statistics.distance:
    PairwiseDistance:
      schemes:
        last: null
Reducers:
  custom:
    Sum:
      schemes:
        total: null
"#;
    let scheme = SchemeBuilder::new(&mut resolver).build_str("isolation", config).unwrap();
    let mut calc = Calculator::new(sample());
    let table = calc.compute(&scheme);

    assert_eq!(
        table.statistic_names(),
        vec![
            "rusty_spoc.statistics.basic.Covariance.first",
            "rusty_spoc.statistics.distance.PairwiseDistance.last",
        ]
    );
    assert_eq!(calc.failures().len(), 1);
    assert_eq!(calc.failures()[0].statistic, "custom.Failing.middle");
}

#[test]
fn same_qualified_name_is_rejected_and_keeps_the_first() {
    let mut resolver = Resolver::default();
    resolver.register_namespace(custom_namespace());
    let config = r#"
Statistics:
  custom:
    Failing:
      schemes:
        middle: null
Reducers:
  custom:
    Sum:
      schemes:
        total: null
"#;
    let mut scheme = SchemeBuilder::new(&mut resolver).build_str("dupes", config).unwrap();
    let first = scheme.statistics().get("custom.Failing.middle").unwrap().id();

    let again = || {
        let inner: Box<dyn Statistic> =
            Box::new(Failing(ComponentInfo::new("Failing", "fail", &[])));
        Instance::new("custom", "Failing", Params::new(), inner)
    };
    match scheme.add_statistic(again(), "middle") {
        Err(ConfigError::DuplicateComponent { name, .. }) => {
            assert_eq!(name, "custom.Failing.middle")
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(name) => panic!("{name} was registered twice"),
    }
    assert_eq!(scheme.statistics().len(), 1);
    assert_eq!(scheme.statistics().get("custom.Failing.middle").unwrap().id(), first);

    scheme.add_statistic(again(), "other").unwrap();
    assert_eq!(
        scheme.statistics().names().collect::<Vec<_>>(),
        vec!["custom.Failing.middle", "custom.Failing.other"]
    );
}

#[test]
fn manifests_deriving_from_each_other_fail_to_build() {
    let dir = tempfile::tempdir().unwrap();
    let ping = dir.path().join("ping.yaml");
    let pong = dir.path().join("pong.yaml");
    fs::write(&ping, format!("Ping:\n  base: {}.Pong\n", pong.display())).unwrap();
    fs::write(&pong, format!("Pong:\n  base: {}.Ping\n", ping.display())).unwrap();

    let config = format!(
        r#"
Statistics:
  {}:
    Ping:
      schemes:
        a: null
"#,
        ping.display()
    );
    match Scheme::from_yaml_str("loop", &config) {
        Err(ConfigError::ModuleLoad { reason, .. }) => assert!(reason.contains("cyclic")),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("manifests deriving from each other must not build"),
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Directed: mean of x minus twice the mean of y.
struct Skewed(ComponentInfo);

impl PairwiseMeasure for Skewed {
    fn info(&self) -> &ComponentInfo {
        &self.0
    }

    fn pairwise_compute(
        &self,
        x: ndarray::ArrayViewD<'_, f64>,
        y: ndarray::ArrayViewD<'_, f64>,
    ) -> ComputeResult<f64> {
        let mean = |v: &ndarray::ArrayViewD<'_, f64>| v.sum() / v.len() as f64;
        Ok(mean(&x) - 2.0 * mean(&y))
    }
}

#[test]
fn pairwise_over_four_variables_is_dense_and_directed() {
    let data = Array2::from_shape_fn((5, 4), |(i, j)| (i + 3 * j) as f64);
    let stat = PairwiseStatistic::new(
        Skewed(ComponentInfo::new("Skewed", "skew", &[])),
        ComparisonAxis::parse("variables").unwrap(),
        false,
    );
    let output = evaluate(&stat, data.clone().into_dyn()).unwrap();
    let matrix = output.result();
    assert_eq!(matrix.shape(), &[4, 4]);

    let means: Vec<f64> = (0..4).map(|j| data.column(j).sum() / 5.0).collect();
    for i in 0..4 {
        assert!((matrix[[i, i]] - (means[i] - 2.0 * means[i])).abs() < 1e-12);
    }
    assert!((matrix[[0, 1]] - matrix[[1, 0]]).abs() > 1e-6);
}

#[test]
fn dynamic_statistic_stacks_per_time_step() {
    let cube = Array3::from_shape_fn((12, 3, 3), |(i, j, k)| {
        ((i * (j + 1)) as f64 * 0.37 + k as f64).sin()
    });
    let scheme = Scheme::from_yaml_str(
        "dynamic",
        r#"
Statistics:
  rusty_spoc.statistics.basic:
    DynamicCovariance:
      schemes:
        dyn: null
    Covariance:
      schemes:
        base: null
Reducers:
  rusty_spoc.reducers.basic:
    Trace:
      schemes:
        t: null
"#,
    )
    .unwrap();

    let dynamic = scheme
        .statistics()
        .get("rusty_spoc.statistics.basic.DynamicCovariance.dyn")
        .unwrap();
    let base = scheme
        .statistics()
        .get("rusty_spoc.statistics.basic.Covariance.base")
        .unwrap();

    let stacked = evaluate(dynamic.component(), cube.clone().into_dyn()).unwrap();
    assert_eq!(stacked.result().shape(), &[3, 3, 3]);
    for k in 0..3 {
        let slice = cube.slice(s![.., .., k]).to_owned().into_dyn();
        let expected = evaluate(base.component(), slice).unwrap();
        let got = stacked.result().slice(s![.., .., k]).to_owned().into_dyn();
        let diff = (&got - expected.result().as_ref()).mapv(f64::abs).sum();
        assert!(diff < 1e-12);
    }
}

#[test]
fn distinct_schemes_get_independent_cache_entries() {
    let config = r#"
Statistics:
  rusty_spoc.statistics.basic:
    Covariance:
      schemes:
        a: null
        b: null
Reducers:
  rusty_spoc.reducers.basic:
    Trace:
      schemes:
        t: null
"#;
    let scheme = Scheme::from_yaml_str("two", config).unwrap();
    let a = scheme.statistics().get("rusty_spoc.statistics.basic.Covariance.a").unwrap();
    let b = scheme.statistics().get("rusty_spoc.statistics.basic.Covariance.b").unwrap();
    assert_ne!(a.id(), b.id());

    let mut calc = Calculator::new(sample());
    calc.compute(&scheme);
    // Two statistics and two reductions, none shared.
    assert_eq!(calc.cache_stats().misses, 4);
}
