// src/sentiment.rs
//! Lexicon-based polarity scoring for headlines and fact cards.
//!
//! The lexicon (`sentiment_lexicon.json`) maps lowercase words to integer
//! valences in `[-4, 4]`. It is embedded at compile time and parsed once on
//! first use. Scoring is a pure function of the text.
//!
//! compound = s / sqrt(s^2 + 15), where `s` is the sum of (possibly negated)
//! valences, so it is always bounded to `[-1, 1]`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::StoryFragment;

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

/// Normalization constant for the compound score.
const ALPHA: f64 = 15.0;

/// How many preceding tokens are checked for a negator.
const NEGATION_WINDOW: usize = 3;

/// Mood counts use the same ±0.1 band as the "slightly" labels.
const MOOD_BAND: f64 = 0.1;

/// Discrete reading of a compound score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SentimentLabel {
    Bullish,
    #[serde(rename = "Slightly Bullish")]
    SlightlyBullish,
    Neutral,
    #[serde(rename = "Slightly Bearish")]
    SlightlyBearish,
    Bearish,
}

impl SentimentLabel {
    /// Lower bounds are inclusive on the bullish side, upper bounds on the bearish side.
    pub fn from_compound(compound: f64) -> Self {
        if !compound.is_finite() {
            return SentimentLabel::Neutral;
        }
        if compound >= 0.3 {
            SentimentLabel::Bullish
        } else if compound >= 0.1 {
            SentimentLabel::SlightlyBullish
        } else if compound > -0.1 {
            SentimentLabel::Neutral
        } else if compound > -0.3 {
            SentimentLabel::SlightlyBearish
        } else {
            SentimentLabel::Bearish
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SentimentLabel::Bullish => "Bullish",
            SentimentLabel::SlightlyBullish => "Slightly Bullish",
            SentimentLabel::Neutral => "Neutral",
            SentimentLabel::SlightlyBearish => "Slightly Bearish",
            SentimentLabel::Bearish => "Bearish",
        }
    }

    /// Display glyph for the composed brief. Presentation only.
    pub fn market_signal(self) -> &'static str {
        match self {
            SentimentLabel::Bullish => "🟢 Bullish",
            SentimentLabel::SlightlyBullish => "🟡 Slightly Bullish",
            SentimentLabel::Neutral => "⚪ Neutral",
            SentimentLabel::SlightlyBearish => "🟠 Slightly Bearish",
            SentimentLabel::Bearish => "🔴 Bearish",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub compound: f64,
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub label: SentimentLabel,
}

impl SentimentScore {
    pub fn neutral() -> Self {
        Self {
            compound: 0.0,
            positive: 0.0,
            negative: 0.0,
            neutral: 1.0,
            label: SentimentLabel::Neutral,
        }
    }

    pub fn market_signal(&self) -> &'static str {
        self.label.market_signal()
    }
}

impl Default for SentimentScore {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Stateless scorer; all state lives in the shared lexicon.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *LEXICON.get(w).unwrap_or(&0)
    }

    /// Score free text. Empty or whitespace-only input yields the neutral score.
    pub fn score(&self, text: &str) -> SentimentScore {
        let tokens: Vec<String> = tokenize(text).collect();
        if tokens.is_empty() {
            return SentimentScore::neutral();
        }

        let mut sum = 0.0f64;
        let mut pos_mass = 0.0f64;
        let mut neg_mass = 0.0f64;
        let mut neutral_count = 0usize;

        for i in 0..tokens.len() {
            let base = self.word_score(tokens[i].as_str());
            if base == 0 {
                neutral_count += 1;
                continue;
            }

            let negated =
                (1..=NEGATION_WINDOW).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            let adj = f64::from(if negated { -base } else { base });
            sum += adj;

            // +1 per sentiment-bearing word, the way VADER weighs proportions
            if adj > 0.0 {
                pos_mass += adj + 1.0;
            } else {
                neg_mass += -adj + 1.0;
            }
        }

        let compound = normalize(sum);
        let total = pos_mass + neg_mass + neutral_count as f64;
        let (positive, negative, neutral) = if total > 0.0 {
            (pos_mass / total, neg_mass / total, neutral_count as f64 / total)
        } else {
            (0.0, 0.0, 1.0)
        };

        SentimentScore {
            compound,
            positive,
            negative,
            neutral,
            label: SentimentLabel::from_compound(compound),
        }
    }

    /// Headline and body are scored as a single concatenated unit.
    pub fn analyze_fragment(&self, fragment: &StoryFragment) -> SentimentScore {
        self.score(&fragment.sentiment_text())
    }
}

/// Convenience wrapper over the shared analyzer.
pub fn score(text: &str) -> SentimentScore {
    SentimentAnalyzer.score(text)
}

fn normalize(sum: f64) -> f64 {
    if sum == 0.0 || !sum.is_finite() {
        return 0.0;
    }
    (sum / (sum * sum + ALPHA).sqrt()).clamp(-1.0, 1.0)
}

/// Alphanumeric tokens, lower-cased.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Apostrophes split tokens, so contractions show up as their stem ("isn", "doesn").
fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn"
            | "wasn"
            | "aren"
            | "weren"
            | "doesn"
            | "didn"
            | "don"
            | "cannot"
            | "without"
            | "nor"
    )
}

/// Aggregate mood over a set of scored items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMood {
    pub average_compound: f64,
    pub label: SentimentLabel,
    pub signal: String,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub neutral_count: usize,
    pub summary: String,
}

impl Default for MarketMood {
    fn default() -> Self {
        compute_market_mood(std::iter::empty())
    }
}

/// Arithmetic mean of `compound`; empty input is a neutral mood, not an error.
pub fn compute_market_mood<'a, I>(scores: I) -> MarketMood
where
    I: IntoIterator<Item = &'a SentimentScore>,
{
    let mut n = 0usize;
    let mut acc = 0.0f64;
    let (mut bullish, mut bearish, mut neutral) = (0usize, 0usize, 0usize);

    for s in scores {
        let c = if s.compound.is_finite() { s.compound } else { 0.0 };
        n += 1;
        acc += c;
        if c >= MOOD_BAND {
            bullish += 1;
        } else if c <= -MOOD_BAND {
            bearish += 1;
        } else {
            neutral += 1;
        }
    }

    let average_compound = if n == 0 {
        0.0
    } else {
        (acc / n as f64).clamp(-1.0, 1.0)
    };
    let label = SentimentLabel::from_compound(average_compound);

    let summary = if n == 0 {
        "No stories to assess".to_string()
    } else if bullish > bearish * 2 {
        format!("Headlines skew bullish ({bullish}/{n} positive stories)")
    } else if bearish > bullish * 2 {
        format!("Headlines skew bearish ({bearish}/{n} negative stories)")
    } else if bullish > bearish {
        format!("Slightly positive tone ({bullish} bullish vs {bearish} bearish)")
    } else if bearish > bullish {
        format!("Slightly negative tone ({bearish} bearish vs {bullish} bullish)")
    } else {
        format!("Balanced sentiment ({bullish} bullish, {bearish} bearish, {neutral} neutral)")
    };

    MarketMood {
        average_compound,
        label,
        signal: label.market_signal().to_string(),
        bullish_count: bullish,
        bearish_count: bearish,
        neutral_count: neutral,
        summary,
    }
}
