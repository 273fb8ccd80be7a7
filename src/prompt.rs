//! Prompt assembly: documents plus rubric interpolated into the fixed evaluation template.
//!
//! Assembly is a pure function of the ordered document set and the rubric text.

use crate::extraction::ExtractedText;
use crate::rubric::RubricDocument;
use std::fmt;

const INSTRUCTIONS: &str = "I want you to create a comprehensive franchise proposal evaluation based on Dr. Spinelli's heuristics framework. Please analyze the provided franchise proposal documents using the heuristics model to evaluate the franchise opportunity.

Your evaluation should include:

1. An analysis of the franchise opportunity across these six dimensions:
   - Market Opportunity Assessment
   - Value Creation & Brand Positioning
   - Operational Excellence & Knowledge Transfer
   - Financial Structure & Alignment
   - Leadership & Support Systems
   - Adaptability & Growth Potential

2. For each dimension, provide:
   - A rating (STRONG, MODERATE, or WEAK)
   - Key strengths (2-3)
   - Key weaknesses (2-3)
   - Supporting quotes from both Dr. Spinelli's heuristics and the franchise documents
   - Specific recommendations (2-3)

3. An overall rating (RECOMMENDED, PROCEED WITH CAUTION, or NOT RECOMMENDED)
4. An executive summary (250-300 words)
5. 5 final recommendations for a potential franchisee

Please structure your response in the following format:

# Franchise Proposal Evaluation: [Name of Franchise]

## Executive Summary
[Your summary here]

## Overall Rating: [RATING]

## Detailed Analysis

### Market Opportunity Assessment
**Rating**: [STRONG/MODERATE/WEAK]

**Strengths**:
- [Strength 1]
- [Strength 2]
- [Strength 3]

**Weaknesses**:
- [Weakness 1]
- [Weakness 2]
- [Weakness 3]

**Supporting Quotes**:
- \"[Quote from Spinelli heuristic]\" \u{2014} Dr. Spinelli
- \"[Quote from franchise document]\" \u{2014} Franchise Document

**Recommendations**:
- [Recommendation 1]
- [Recommendation 2]
- [Recommendation 3]

[Repeat this structure for each dimension]

## Final Recommendations
1. [Recommendation 1]
2. [Recommendation 2]
3. [Recommendation 3]
4. [Recommendation 4]
5. [Recommendation 5]
";

/// Ordered name → text map of extracted documents.
///
/// Inserting a name that is already present replaces its text in place, so every name appears
/// exactly once and keeps its first position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSet {
    entries: Vec<(String, String)>,
}

impl DocumentSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the text stored under `name`.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        let text = text.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => {
                tracing::debug!(file = %name, "Duplicate document name; replacing earlier text");
                entry.1 = text;
            }
            None => self.entries.push((name, text)),
        }
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, text)| (name.as_str(), text.as_str()))
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds no documents.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ExtractedText> for DocumentSet {
    fn from_iter<I: IntoIterator<Item = ExtractedText>>(iter: I) -> Self {
        let mut set = Self::new();
        for extracted in iter {
            set.insert(extracted.source_name, extracted.content);
        }
        set
    }
}

/// Final text payload sent to the text-generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt(String);

impl AssembledPrompt {
    /// Borrow the prompt text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take ownership of the prompt text.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the prompt is empty (never true for assembled prompts).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AssembledPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wrap each document in `<document>` / `<source>` / `<document_content>` tags.
pub fn document_block(documents: &DocumentSet) -> String {
    let mut block = String::new();
    for (name, text) in documents.iter() {
        block.push_str("<document>\n<source>");
        block.push_str(name);
        block.push_str("</source>\n<document_content>");
        block.push_str(text);
        block.push_str("</document_content>\n</document>\n\n");
    }
    block
}

/// Interpolate the documents and rubric into the evaluation template.
pub fn assemble_prompt(documents: &DocumentSet, rubric: &RubricDocument) -> AssembledPrompt {
    let block = document_block(documents);
    let prompt = format!(
        "\n<documents>\n{block}\n</documents>\n\nHere is a heuristics model:\n{rubric}\n\n{INSTRUCTIONS}"
    );
    tracing::debug!(
        documents = documents.len(),
        prompt_bytes = prompt.len(),
        "Assembled evaluation prompt"
    );
    AssembledPrompt(prompt)
}
