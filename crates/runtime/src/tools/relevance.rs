//! Keyword gate deciding whether a tool is offered for an utterance.

/// Include/exclude keyword sets for one tool.
///
/// Matching is by substring after lowercasing and stripping Spanish
/// diacritics from both sides, so `"mañana"` matches `"Manana"`. Any exclude
/// match suppresses the tool; otherwise any include match offers it. With no
/// match the tool is not offered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelevanceFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    always: bool,
}

impl RelevanceFilter {
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            include: normalize_all(include),
            exclude: normalize_all(exclude),
            always: false,
        }
    }

    /// A filter that offers the tool for every utterance.
    pub fn always() -> Self {
        Self {
            always: true,
            ..Self::default()
        }
    }

    /// A filter that never offers the tool (it can still be dispatched).
    pub fn never() -> Self {
        Self::default()
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn is_relevant(&self, utterance: &str) -> bool {
        if self.always {
            return true;
        }
        let text = fold(utterance);
        if self.exclude.iter().any(|k| text.contains(k.as_str())) {
            return false;
        }
        self.include.iter().any(|k| text.contains(k.as_str()))
    }
}

fn normalize_all<I>(keywords: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut out: Vec<String> = keywords
        .into_iter()
        .map(|k| fold(k.as_ref().trim()))
        .filter(|k| !k.is_empty())
        .collect();
    out.dedup();
    out
}

/// Lowercase and strip the diacritics used in Spanish.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather() -> RelevanceFilter {
        RelevanceFilter::new(
            ["temperatura", "tiempo", "lluvia", "mañana", "pronóstico"],
            ["habitantes", "población"],
        )
    }

    #[test]
    fn include_match_offers_tool() {
        assert!(weather().is_relevant("¿Qué tiempo hará mañana en Madrid?"));
    }

    #[test]
    fn exclude_wins_over_include() {
        assert!(!weather().is_relevant("¿Cuántos habitantes tendrá Madrid mañana?"));
    }

    #[test]
    fn no_match_is_not_relevant() {
        assert!(!weather().is_relevant("Cuéntame un chiste"));
    }

    #[test]
    fn matching_ignores_case_and_accents() {
        assert!(weather().is_relevant("PRONOSTICO para Lugo"));
        assert!(weather().is_relevant("lluvia manana"));
        assert!(!weather().is_relevant("poblacion de Lugo y su tiempo"));
    }

    #[test]
    fn always_and_never() {
        assert!(RelevanceFilter::always().is_relevant("lo que sea"));
        assert!(!RelevanceFilter::never().is_relevant("temperatura"));
    }

    #[test]
    fn fold_strips_diacritics() {
        assert_eq!(fold("Año PRONÓSTICO Güell"), "ano pronostico guell");
    }
}
