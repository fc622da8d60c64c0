//! Topic-exchange binding patterns.

use std::str::FromStr;

use crate::error::BusError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    /// `*`: exactly one word.
    Star,
    /// `#`: zero or more words.
    Hash,
}

/// A binding pattern for a topic exchange.
///
/// Patterns are dot-separated words. `*` matches exactly one word and `#`
/// matches zero or more words, so `order.*` matches `order.created` and
/// `#` matches every routing key. A pattern without wildcards is an exact key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    source: String,
    tokens: Vec<Token>,
}

impl TopicPattern {
    /// Parses a binding pattern.
    pub fn parse(pattern: &str) -> Result<Self, BusError> {
        let invalid = |reason: &str| BusError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let tokens = pattern
            .split('.')
            .map(|word| match word {
                "" => Err(invalid("empty word")),
                "*" => Ok(Token::Star),
                "#" => Ok(Token::Hash),
                w if w.contains(['*', '#']) => Err(invalid("wildcard inside a word")),
                w => Ok(Token::Word(w.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: pattern.to_string(),
            tokens,
        })
    }

    /// Returns true if the routing key is routed by this pattern.
    pub fn matches(&self, routing_key: &str) -> bool {
        let words: Vec<&str> = routing_key.split('.').collect();
        match_words(&self.tokens, &words)
    }

    /// Returns true if the pattern has no wildcards.
    pub fn is_exact(&self) -> bool {
        self.tokens.iter().all(|t| matches!(t, Token::Word(_)))
    }

    /// Returns the pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Translates the pattern to a NATS subject filter: `*` stays `*` and a
    /// trailing `#` becomes `>`.
    ///
    /// NATS has no wildcard for zero words, so `order.#` does not see a bare
    /// `order` key. `#` anywhere but last has no NATS form and is rejected.
    pub fn nats_filter(&self) -> Result<String, BusError> {
        let last = self.tokens.len() - 1;
        let words = self
            .tokens
            .iter()
            .enumerate()
            .map(|(i, token)| match token {
                Token::Word(w) => Ok(w.as_str()),
                Token::Star => Ok("*"),
                Token::Hash if i == last => Ok(">"),
                Token::Hash => Err(BusError::InvalidPattern {
                    pattern: self.source.clone(),
                    reason: "NATS only supports '#' as the last word".to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(words.join("."))
    }
}

fn match_words(tokens: &[Token], words: &[&str]) -> bool {
    match tokens.split_first() {
        None => words.is_empty(),
        Some((Token::Hash, rest)) => (0..=words.len()).any(|skip| match_words(rest, &words[skip..])),
        Some((Token::Star, rest)) => !words.is_empty() && match_words(rest, &words[1..]),
        Some((Token::Word(w), rest)) => {
            words.first().is_some_and(|first| first == w) && match_words(rest, &words[1..])
        }
    }
}

/// Validates a routing key used for publishing (no wildcards, no empty words).
pub(crate) fn validate_routing_key(routing_key: &str) -> Result<(), BusError> {
    let pattern = TopicPattern::parse(routing_key)?;
    if !pattern.is_exact() {
        return Err(BusError::InvalidPattern {
            pattern: routing_key.to_string(),
            reason: "routing keys cannot contain wildcards".to_string(),
        });
    }
    Ok(())
}

impl FromStr for TopicPattern {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
