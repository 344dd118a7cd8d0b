use crate::config::CategoryRule;
use crate::formats::UNCATEGORIZED;

/// Ordered category rules with first-match-wins evaluation.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: Vec<CompiledRule>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    slug: String,
    sections: Vec<String>,
    patterns: Vec<String>,
}

impl CompiledRule {
    fn matches_section(&self, section: Option<&str>) -> bool {
        let Some(section) = section else {
            return false;
        };
        let section = section.to_lowercase();
        self.sections.iter().any(|s| section.contains(s.as_str()))
    }

    fn matches_any(&self, lowered: &[String]) -> bool {
        self.patterns
            .iter()
            .any(|p| lowered.iter().any(|value| value.contains(p.as_str())))
    }
}

fn lowered(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

fn compile_patterns(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

impl Classifier {
    pub fn new(rules: &[CategoryRule]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| CompiledRule {
                slug: rule.slug.clone(),
                sections: compile_patterns(&rule.match_sections),
                patterns: compile_patterns(&rule.match_tags),
            })
            .collect();
        Self { rules }
    }

    /// Section label first, then tags, then materials, per category in order.
    pub fn assign(&self, tags: &[String], materials: &[String], section: Option<&str>) -> &str {
        let tags = lowered(tags);
        let materials = lowered(materials);

        for rule in &self.rules {
            if rule.matches_section(section)
                || rule.matches_any(&tags)
                || rule.matches_any(&materials)
            {
                return &rule.slug;
            }
        }
        UNCATEGORIZED
    }
}

pub fn assign_category(
    rules: &[CategoryRule],
    tags: &[String],
    materials: &[String],
    section: Option<&str>,
) -> String {
    Classifier::new(rules)
        .assign(tags, materials, section)
        .to_owned()
}
