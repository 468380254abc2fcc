//! Extraction instruction sent alongside every page image.
//!
//! Keeping the instruction here, apart from the request plumbing in
//! [`crate::pipeline::llm`], means the output schema can be tuned in exactly
//! one place, and tests can inspect it without a live model.
//!
//! Callers can override it via [`crate::config::ExtractionConfig::instruction`];
//! the constant here is used only when no override is provided.
//!
//! The minimum counts below (five points, five glossary terms) are guidance
//! for the model only. [`crate::pipeline::normalize`] stores whatever the
//! model actually returned.

/// Default instruction for extracting articles from a newspaper page image.
pub const EXTRACTION_PROMPT: &str = r#"Task: extract EVERY news article from the attached newspaper page image. Skip advertisements, but do not skip any article. Return the result strictly as a JSON array with one object per article.

Each article object must have exactly this shape:

{
  "articleId": <number>,
  "title": "<the headline exactly as printed on the page>",
  "involvement": "<every person, organisation or group involved, each written as: Name: a short, simple explanation of who or what it is>",
  "past": "<a paragraph of at least 4 lines explaining the background and earlier events that led to this news>",
  "present": "<a paragraph of at most 10 lines explaining what the article reports now>",
  "points": [
    "<at least 5 key points in very simple English, each ending with a full stop>"
  ],
  "glossary": {
    "<word or abbreviation>": "<simple meaning, or full form plus meaning>"
  }
}

Rules:

1. OUTPUT
   - The whole answer is ONE JSON array, one object per news article.
   - Output only the JSON. No commentary before or after it.

2. TITLE
   - Copy the headline exactly as printed. Do not correct, shorten or translate it.

3. INVOLVEMENT
   - List every person, organisation or group the article mentions.
   - Write the name directly followed by a short explanation. Do not add labels such as "Name:" or "Role:".

4. PAST
   - One factual paragraph of 4 or more lines about the events that led to this news.
   - Use simple words, as if explaining to someone with no prior knowledge. No bullet points.

5. PRESENT
   - One descriptive paragraph of up to 10 lines covering the full content of the article.
   - Keep it short and simple but complete. No bullet points.

6. POINTS
   - At least 5 key takeaways in very easy English.
   - They should help students preparing for competitive government exams (UPSC, SSC).
   - Each point must be meaningful, self-contained and end with a full stop.

7. GLOSSARY
   - Mandatory. At least 5 terms taken from the article.
   - Use difficult or unusual English words with simple meanings, and abbreviations with their full form and a simple explanation.
   - Do NOT include names of people, groups or organisations; those belong in "involvement"."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_column() {
        for field in ["title", "involvement", "past", "present", "points", "glossary"] {
            assert!(
                EXTRACTION_PROMPT.contains(&format!("\"{field}\"")),
                "prompt is missing field {field}"
            );
        }
    }

    #[test]
    fn prompt_demands_a_json_array() {
        assert!(EXTRACTION_PROMPT.contains("JSON array"));
    }
}
