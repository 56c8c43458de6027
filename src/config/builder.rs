use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use serde_yaml::{Mapping, Value};

use super::filter::StatisticFilter;
use super::Scheme;
use crate::component::{Archetype, Instance, ParamValue};
use crate::error::{ConfigError, ConfigResult};
use crate::registry::resolver::CROSS;
use crate::registry::{ComponentClass, Resolution, Resolver};

/// Key of the reducer block entry restricting it to some statistics.
pub(crate) const FILTER_KEY: &str = "Statistics";

/// Turns configuration mappings into [`Scheme`]s, resolving modules and
/// classes through a borrowed [`Resolver`] so its caches outlive one build.
pub struct SchemeBuilder<'r> {
    resolver: &'r mut Resolver,
}

impl<'r> SchemeBuilder<'r> {
    pub fn new(resolver: &'r mut Resolver) -> Self {
        Self { resolver }
    }

    pub fn build_str(&mut self, name: &str, text: &str) -> ConfigResult<Scheme> {
        let config: Value = serde_yaml::from_str(text)?;
        self.build(name, &config)
    }

    /// YAML or JSON file; both are read with the YAML parser.
    pub fn build_file(&mut self, name: &str, path: &Path) -> ConfigResult<Scheme> {
        let text = fs::read_to_string(path)?;
        self.build_str(name, &text)
    }

    /// Statistics first, then reducers (whose filters match against the
    /// statistics), then reduced statistics.
    pub fn build(&mut self, name: &str, config: &Value) -> ConfigResult<Scheme> {
        info!("Building internal configuration.");
        let mut scheme = Scheme::new(name);

        let root = match config {
            Value::Mapping(root) => Some(root),
            Value::Null => None,
            _ => {
                return Err(ConfigError::InvalidSection {
                    context: "configuration".to_string(),
                    expected: "a mapping of Statistics, Reducers and ReducedStatistics",
                })
            }
        };

        if let Some(root) = root {
            for archetype in Archetype::ALL {
                match root.get(archetype.section()) {
                    None | Some(Value::Null) => {}
                    Some(Value::Mapping(section)) => {
                        self.build_section(&mut scheme, archetype, section)?
                    }
                    Some(_) => {
                        return Err(ConfigError::InvalidSection {
                            context: format!("{} definition", archetype.section()),
                            expected: "a mapping of module references",
                        })
                    }
                }
            }
        }

        scheme.validate()?;
        Ok(scheme)
    }

    fn build_section(
        &mut self,
        scheme: &mut Scheme,
        archetype: Archetype,
        section: &Mapping,
    ) -> ConfigResult<()> {
        for (module_key, classes) in section {
            let module_ref =
                key_str(module_key, &format!("{} module reference", archetype.section()))?;
            let Value::Mapping(classes) = classes else {
                return Err(ConfigError::InvalidSection {
                    context: format!("{archetype}s definition under module {module_ref}"),
                    expected: "a mapping of class names",
                });
            };

            let Some(namespace) = self.resolver.resolve_module(module_ref)? else {
                warn!("  {CROSS} Module {module_ref} could not be found. Skipping.");
                continue;
            };

            for (class_key, block) in classes {
                let class_name =
                    key_str(class_key, &format!("{archetype} name under module {module_ref}"))?;
                let resolution =
                    self.resolver.resolve_class(archetype, class_name, block, &namespace);
                let class = match resolution {
                    Resolution::Found(class) => class,
                    Resolution::Skipped(_) => continue,
                };
                self.build_class(scheme, archetype, module_ref, &class, block)?;
            }
        }
        Ok(())
    }

    fn build_class(
        &mut self,
        scheme: &mut Scheme,
        archetype: Archetype,
        module_ref: &str,
        class: &Arc<ComponentClass>,
        block: &Value,
    ) -> ConfigResult<()> {
        let class_name = class.name();
        let Value::Mapping(block) = block else {
            return Err(ConfigError::InvalidSection {
                context: format!("{archetype} {class_name} definition under module {module_ref}"),
                expected: "a mapping with a 'schemes' entry",
            });
        };

        let missing_schemes = || ConfigError::MissingSchemes {
            archetype,
            class: class_name.to_string(),
            module: module_ref.to_string(),
        };
        let schemes = match block.get("schemes") {
            None | Some(Value::Null) => return Err(missing_schemes()),
            Some(Value::Mapping(schemes)) if schemes.is_empty() => return Err(missing_schemes()),
            Some(Value::Mapping(schemes)) => schemes,
            Some(_) => {
                return Err(ConfigError::InvalidSection {
                    context: format!(
                        "{archetype} {class_name} 'schemes' definition under module {module_ref}"
                    ),
                    expected: "a mapping of scheme names",
                })
            }
        };

        let filter = match (archetype, block.get(FILTER_KEY)) {
            (Archetype::Reducer, Some(value)) => StatisticFilter::from_value(
                value,
                &format!(
                    "Reducer {class_name} '{FILTER_KEY}' definition under module {module_ref}"
                ),
            )?,
            _ => None,
        };

        for (scheme_key, args) in schemes {
            let scheme_name =
                key_str(scheme_key, &format!("{archetype} {class_name} scheme name"))?;
            let overrides = scheme_arguments(args, archetype, class_name, scheme_name, module_ref)?;

            let params = class.schema().merge(&overrides).map_err(|mismatch| {
                if !mismatch.missing.is_empty() {
                    ConfigError::MissingArguments {
                        archetype,
                        class: class_name.to_string(),
                        scheme: scheme_name.to_string(),
                        module: module_ref.to_string(),
                        missing: mismatch.missing,
                    }
                } else {
                    ConfigError::UnknownArguments {
                        archetype,
                        class: class_name.to_string(),
                        scheme: scheme_name.to_string(),
                        module: module_ref.to_string(),
                        unknown: mismatch.unknown,
                    }
                }
            })?;

            let failed = |source: ConfigError| ConfigError::Instantiation {
                archetype,
                class: class_name.to_string(),
                scheme: scheme_name.to_string(),
                source: Box::new(source),
            };

            match archetype {
                Archetype::Statistic => {
                    let inner = class.instantiate_statistic(&params).map_err(failed)?;
                    let instance = Instance::new(module_ref, class_name, params, inner);
                    scheme.add_statistic(instance, scheme_name)?;
                }
                Archetype::ReducedStatistic => {
                    let inner = class.instantiate_statistic(&params).map_err(failed)?;
                    let instance = Instance::new(module_ref, class_name, params, inner);
                    scheme.add_reduced_statistic(instance, scheme_name)?;
                }
                Archetype::Reducer => {
                    let inner = class.instantiate_reducer(&params).map_err(failed)?;
                    scheme.add_reducer(
                        Instance::new(module_ref, class_name, params, inner),
                        scheme_name,
                        filter.clone(),
                    )?;
                }
            }
        }
        Ok(())
    }
}

fn key_str<'v>(key: &'v Value, context: &str) -> ConfigResult<&'v str> {
    key.as_str().ok_or_else(|| ConfigError::InvalidSection {
        context: context.to_string(),
        expected: "a string key",
    })
}

/// A scheme's arguments: null for all defaults, or a mapping of overrides.
fn scheme_arguments(
    args: &Value,
    archetype: Archetype,
    class_name: &str,
    scheme_name: &str,
    module_ref: &str,
) -> ConfigResult<Vec<(String, ParamValue)>> {
    let args = match args {
        Value::Null => return Ok(Vec::new()),
        Value::Mapping(args) => args,
        _ => {
            return Err(ConfigError::InvalidSection {
                context: format!(
                    "{archetype} {class_name} scheme '{scheme_name}' under module {module_ref}"
                ),
                expected: "null or a mapping of arguments",
            })
        }
    };

    args.iter()
        .map(|(key, value)| {
            let context = format!("{archetype} {class_name} scheme '{scheme_name}' argument");
            let name = key_str(key, &context)?;
            let value = ParamValue::from_yaml(value).ok_or_else(|| ConfigError::InvalidParameter {
                param: name.to_string(),
                expected: "a scalar or a list",
                found: "a mapping".to_string(),
            })?;
            Ok((name.to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
Statistics:
  rusty_spoc.statistics.basic:
    Covariance:
      schemes:
        std: null
        sq:
          squared: true
    PearsonR:
      schemes:
        default:
          squared: false
Reducers:
  rusty_spoc.reducers.basic:
    Trace:
      schemes:
        default: null
      Statistics: rusty_spoc.statistics.basic.Covariance.*
"#;

    fn build(text: &str) -> ConfigResult<Scheme> {
        let mut resolver = Resolver::default();
        SchemeBuilder::new(&mut resolver).build_str("test", text)
    }

    #[test]
    fn builds_partitions_and_filters() {
        let scheme = build(CONFIG).unwrap();
        let stats: Vec<&str> = scheme.statistics().names().collect();
        assert_eq!(
            stats,
            vec![
                "rusty_spoc.statistics.basic.Covariance.std",
                "rusty_spoc.statistics.basic.Covariance.sq",
                "rusty_spoc.statistics.basic.PearsonR.default",
            ]
        );
        let filter = scheme
            .reducer_filter("rusty_spoc.reducers.basic.Trace.default")
            .unwrap();
        assert_eq!(filter.matched().len(), 2);

        let sq = scheme
            .statistics()
            .get("rusty_spoc.statistics.basic.Covariance.sq")
            .unwrap();
        assert_eq!(sq.component().identifier(), "cov.sq");
        assert_eq!(sq.scheme(), Some("sq"));
    }

    #[test]
    fn missing_required_argument_names_everything() {
        let text = r#"
Statistics:
  rusty_spoc.statistics.basic:
    PearsonR:
      schemes:
        broken: null
Reducers:
  rusty_spoc.reducers.basic:
    Trace:
      schemes:
        default: null
"#;
        match build(text) {
            Err(ConfigError::MissingArguments { class, scheme, missing, .. }) => {
                assert_eq!(class, "PearsonR");
                assert_eq!(scheme, "broken");
                assert_eq!(missing, vec!["squared"]);
            }
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn unknown_argument_is_fatal() {
        let text = r#"
ReducedStatistics:
  rusty_spoc.rstatistics.basic:
    MarginalMoments:
      schemes:
        x:
          moments: [1]
          colour: blue
"#;
        assert!(matches!(build(text), Err(ConfigError::UnknownArguments { .. })));
    }

    #[test]
    fn unknown_modules_and_classes_are_skipped() {
        let text = r#"
Statistics:
  no.such.module:
    Anything:
      schemes:
        x: null
  rusty_spoc.statistics.basic:
    NotAClass:
      schemes:
        x: null
    Statistic:
      schemes:
        x: null
    Covariance:
      schemes:
        x: null
Reducers:
  rusty_spoc.reducers.basic:
    Mean:
      schemes:
        x: null
"#;
        let scheme = build(text).unwrap();
        assert_eq!(scheme.statistics().len(), 1);
    }

    #[test]
    fn structural_errors() {
        assert!(matches!(build("- 1\n- 2\n"), Err(ConfigError::InvalidSection { .. })));
        assert!(matches!(
            build("Statistics:\n  rusty_spoc.statistics.basic:\n    Covariance: {}\n"),
            Err(ConfigError::MissingSchemes { .. })
        ));
        assert!(matches!(
            build(
                "Statistics:\n  rusty_spoc.statistics.basic:\n    Covariance:\n      schemes: [a]\n"
            ),
            Err(ConfigError::InvalidSection { .. })
        ));
        assert!(matches!(build(""), Err(ConfigError::NoComponents)));
    }

    #[test]
    fn bad_parameter_values_fail_instantiation() {
        let text = r#"
ReducedStatistics:
  rusty_spoc.rstatistics.basic:
    PcaVarianceExplainedRatio:
      schemes:
        x:
          components: first
"#;
        let Err(err) = build(text) else {
            panic!("a non-integer component index must not build");
        };
        assert!(matches!(err, ConfigError::Instantiation { .. }));
        assert!(matches!(err.root(), ConfigError::InvalidParameter { .. }));
    }
}
