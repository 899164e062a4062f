//! Family resolution for curated TPTs that carry no family tag.
//!
//! Each family template is reduced to its identity-bearing transform ids in
//! canonical order. A curated identity path matches a template if the two
//! agree step by step, where template steps marked `optional` may be
//! skipped. Parameters are ignored. Templates are tried in rule-file order
//! and the first match wins.

use taxograph_spec::rules::{FamilyRule, PrefixScope};
use taxograph_spec::{PathStep, TransformRegistry};

#[derive(Debug, Clone)]
struct TemplateStep {
    id: String,
    optional: bool,
}

#[derive(Debug, Clone)]
struct Template {
    family: String,
    scopes: Vec<PrefixScope>,
    steps: Vec<TemplateStep>,
}

/// Matches identity paths against family templates.
#[derive(Debug, Clone, Default)]
pub struct FamilyMatcher {
    templates: Vec<Template>,
}

impl FamilyMatcher {
    /// Builds the matcher from family rules.
    #[must_use]
    pub fn new(rules: &[FamilyRule], registry: &TransformRegistry) -> Self {
        let templates = rules
            .iter()
            .map(|rule| {
                let mut steps: Vec<(i64, TemplateStep)> = rule
                    .path
                    .iter()
                    .filter_map(|step| {
                        let tf = registry.get(&step.id).filter(|tf| tf.identity)?;
                        Some((
                            tf.order,
                            TemplateStep {
                                id: step.id.clone(),
                                optional: step.optional,
                            },
                        ))
                    })
                    .collect();
                steps.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
                Template {
                    family: rule.family.clone(),
                    scopes: rule.applies_to.clone(),
                    steps: steps.into_iter().map(|(_, s)| s).collect(),
                }
            })
            .collect();
        Self { templates }
    }

    /// Returns the first family whose scope covers (`taxon_id`, `part_id`)
    /// and whose template matches `identity`.
    #[must_use]
    pub fn resolve(&self, taxon_id: &str, part_id: &str, identity: &[PathStep]) -> Option<&str> {
        self.templates
            .iter()
            .filter(|t| {
                t.scopes
                    .iter()
                    .any(|s| s.matches_taxon(taxon_id) && s.allows_part(part_id))
            })
            .find(|t| template_matches(&t.steps, identity))
            .map(|t| t.family.as_str())
    }
}

fn template_matches(template: &[TemplateStep], path: &[PathStep]) -> bool {
    let mut t = 0;
    let mut p = 0;
    while t < template.len() {
        if p < path.len() && template[t].id == path[p].id {
            t += 1;
            p += 1;
        } else if template[t].optional {
            t += 1;
        } else {
            return false;
        }
    }
    p == path.len()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use taxograph_spec::registry::TransformsCanon;
    use taxograph_spec::Transform;

    use super::*;

    fn tf(id: &str, order: i64, identity: bool) -> Transform {
        serde_json::from_value(json!({
            "id": id, "name": id, "order": order, "identity": identity
        }))
        .expect("transform")
    }

    fn rule(value: serde_json::Value) -> FamilyRule {
        serde_json::from_value(value).expect("family rule")
    }

    fn matcher() -> FamilyMatcher {
        let registry = TransformRegistry::from_canon(TransformsCanon {
            transforms: vec![
                tf("tf:cure", 10, true),
                tf("tf:smoke", 20, true),
                tf("tf:pasteurize", 5, false),
            ],
            applicability: Vec::new(),
        });
        FamilyMatcher::new(
            &[
                rule(json!({
                    "family": "smoked_cured",
                    "applies_to": [{"taxon_prefix": "tx:a", "parts": ["part:muscle"]}],
                    "path": [{"id": "tf:smoke"}, {"id": "tf:pasteurize"}, {"id": "tf:cure", "optional": true}]
                })),
                rule(json!({
                    "family": "cured",
                    "applies_to": [{"taxon_prefix": "tx:a"}],
                    "path": [{"id": "tf:cure"}]
                })),
            ],
            &registry,
        )
    }

    #[test]
    fn optional_steps_may_be_absent() {
        let m = matcher();
        let both = [PathStep::new("tf:cure"), PathStep::new("tf:smoke")];
        let smoke_only = [PathStep::new("tf:smoke")];
        assert_eq!(
            m.resolve("tx:a:sus", "part:muscle", &both),
            Some("smoked_cured")
        );
        assert_eq!(
            m.resolve("tx:a:sus", "part:muscle", &smoke_only),
            Some("smoked_cured")
        );
    }

    #[test]
    fn scope_and_extra_steps_block_matches() {
        let m = matcher();
        let cure = [PathStep::new("tf:cure")];
        assert_eq!(m.resolve("tx:a:sus", "part:muscle", &cure), Some("cured"));
        assert_eq!(m.resolve("tx:p:malus", "part:fruit", &cure), None);
        let extra = [PathStep::new("tf:cure"), PathStep::new("tf:dry")];
        assert_eq!(m.resolve("tx:a:sus", "part:fat", &extra), None);
    }
}
