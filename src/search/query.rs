//! Search query object and free-text auto-query parsing.

use crate::sql::OrderBy;

/// One search term: a single word or an exact phrase of words.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Word(String),
    Phrase(Vec<String>),
}

impl Term {
    fn from_tokens(mut tokens: Vec<String>) -> Option<Self> {
        match tokens.len() {
            0 => None,
            1 => tokens.pop().map(Term::Word),
            _ => Some(Term::Phrase(tokens)),
        }
    }

    fn to_tsquery(&self) -> String {
        match self {
            Term::Word(w) => w.clone(),
            Term::Phrase(words) => format!("({})", words.join(" <-> ")),
        }
    }
}

/// Free text parsed into required and excluded terms.
///
/// `solar "wind farm" -coal` requires `solar` and the phrase `wind farm` and excludes `coal`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutoQuery {
    pub required: Vec<Term>,
    pub excluded: Vec<Term>,
}

/// Lowercase alphanumeric/underscore tokens of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl AutoQuery {
    pub fn parse(input: &str) -> Self {
        let mut query = AutoQuery::default();
        let mut chars = input.chars().peekable();
        loop {
            while chars.peek().map_or(false, |c| c.is_whitespace()) {
                chars.next();
            }
            let Some(&first) = chars.peek() else { break };
            let negated = first == '-';
            if negated {
                chars.next();
            }
            let raw: String = if chars.peek() == Some(&'"') {
                chars.next();
                let mut phrase = String::new();
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    phrase.push(c);
                }
                phrase
            } else {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                word
            };
            if let Some(term) = Term::from_tokens(tokenize(&raw)) {
                if negated {
                    query.excluded.push(term);
                } else {
                    query.required.push(term);
                }
            }
        }
        query
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.excluded.is_empty()
    }

    /// PostgreSQL tsquery text: required terms ANDed, excluded terms negated.
    pub fn to_tsquery(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .required
            .iter()
            .map(Term::to_tsquery)
            .chain(self.excluded.iter().map(|t| format!("!{}", t.to_tsquery())))
            .collect();
        Some(parts.join(" & "))
    }
}

/// Query against one indexed model: facet aggregation, narrowing, free text and ordering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchQuery {
    pub model: String,
    pub facets: Vec<String>,
    /// `(field, value)` pairs; every pair must match.
    pub narrow: Vec<(String, String)>,
    pub auto: Option<AutoQuery>,
    pub order: Vec<OrderBy>,
}

impl SearchQuery {
    pub fn models(model: &str) -> Self {
        SearchQuery {
            model: model.to_string(),
            ..Default::default()
        }
    }

    pub fn facet(mut self, field: &str) -> Self {
        self.facets.push(field.to_string());
        self
    }

    /// Narrow by `field:value`.
    pub fn narrow(mut self, clause: &str) -> Self {
        if let Some((field, value)) = clause.split_once(':') {
            self.narrow.push((field.to_string(), value.to_string()));
        }
        self
    }

    /// Apply free text. Input with no usable terms leaves the query unchanged.
    pub fn auto_query(mut self, text: &str) -> Self {
        let parsed = AutoQuery::parse(text);
        if !parsed.is_empty() {
            self.auto = Some(parsed);
        }
        self
    }

    pub fn order_by(mut self, order: Vec<OrderBy>) -> Self {
        self.order = order;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_words_phrases_and_exclusions() {
        let q = AutoQuery::parse(r#"Solar "wind  farm" -coal -"oil rig""#);
        assert_eq!(
            q.required,
            vec![
                Term::Word("solar".into()),
                Term::Phrase(vec!["wind".into(), "farm".into()])
            ]
        );
        assert_eq!(
            q.excluded,
            vec![
                Term::Word("coal".into()),
                Term::Phrase(vec!["oil".into(), "rig".into()])
            ]
        );
        assert_eq!(
            q.to_tsquery().as_deref(),
            Some("solar & (wind <-> farm) & !coal & !(oil <-> rig)")
        );
    }

    #[test]
    fn strips_punctuation_and_drops_empty_terms() {
        let q = AutoQuery::parse("  hello!!  --  ' ");
        assert_eq!(q.required, vec![Term::Word("hello".into())]);
        assert!(q.excluded.is_empty());
        assert!(AutoQuery::parse("  ").to_tsquery().is_none());
    }

    #[test]
    fn hyphenated_words_become_phrases() {
        let q = AutoQuery::parse("open-source");
        assert_eq!(
            q.required,
            vec![Term::Phrase(vec!["open".into(), "source".into()])]
        );
    }

    #[test]
    fn builder_ignores_blank_text() {
        let q = SearchQuery::models("project/sheet/projectsheet")
            .facet("tags")
            .narrow("tags:urgent")
            .auto_query("   ");
        assert_eq!(q.facets, vec!["tags".to_string()]);
        assert_eq!(q.narrow, vec![("tags".to_string(), "urgent".to_string())]);
        assert!(q.auto.is_none());
    }

    #[test]
    fn narrow_keeps_colons_in_values() {
        let q = SearchQuery::models("m").narrow("tags:a:b");
        assert_eq!(q.narrow, vec![("tags".to_string(), "a:b".to_string())]);
    }
}
