//! Prompt templates

use crate::config::{Persona, PromotionStyle, WritingStyle};
use crate::types::{DailyOverview, HistoryEntry, NoteArticle, TrendAngle, TrendItem};

const STRUCTURE_RULES: &str = "\
## Structure rules
1. Hook: the first line must stop the scroll. Use a surprising claim, a relatable question, a striking episode, or a concrete number.
2. Body: no abstractions. Include a proper noun, a number, or a lived experience.
3. Close: do not wrap it up. Leave something unsaid for the reader.
4. Stay within {char_range}. Never exceed it.

## Reach
- No calls to action such as asking for likes or follows.
- No external links in the body.
- No hashtags.
- Take a position; a post without a claim moves nobody.";

const FORMAT_RULES: &str = "\
## Formatting for phone screens
- One sentence per line. Never pack several sentences into one line.
- A long sentence may break after a natural pause, never inside a phrase.
- Split the post into two or three blocks separated by one blank line.
- No long paragraphs without line breaks.";

const OUTPUT_RULES: &str = "\
## Output
Return only the post body. No headings, explanations or surrounding quotes.
Follow the formatting rules above.";

/// Everything a post prompt needs besides the trend list
pub struct PostPromptParts<'a> {
    pub style: &'a WritingStyle,
    pub persona: &'a str,
    pub guidelines: &'a str,
    pub ng_expressions: &'a str,
    pub feedback: &'a str,
}

fn style_section(style: &WritingStyle) -> String {
    format!(
        "## Style for this post: {name}\n\
         - Style instruction (highest priority): {description}\n\
         - Length: {char_range}\n\
         - Structure: {structure}\n\n\
         ### Style sample\n\
         Match the tone, rhythm and line breaks of this sample, not its content:\n\
         ---\n{example}\n---",
        name = style.name,
        description = style.description,
        char_range = style.char_range,
        structure = style.structure,
        example = style.example,
    )
}

/// Prompt for a post built around the given trend lines
///
/// `trends` is `None` for posts that draw only on the persona.
pub fn post_prompt(parts: &PostPromptParts<'_>, trends: Option<&str>) -> String {
    let task = match trends {
        Some(_) => "## Task\nPick one trend below and write exactly one post as the inner voice of the person described.",
        None => "## Task\nWrite exactly one post as the inner voice of the person described.\nThere is no trend input: choose a theme from their daily life, values and experience.",
    };
    let trend_section = trends
        .map(|t| format!("### Trends\n{}\n\n", t))
        .unwrap_or_default();

    format!(
        "{task}\n\n{structure}\n\n{format}\n\n{style}\n\n{guidelines}\n\n\
         ## Expressions to avoid\n{ng}\n\n\
         ## Input\n\n{trend_section}### Person\n{persona}\n\n{feedback}\n\n{output}\n",
        task = task,
        structure = STRUCTURE_RULES.replace("{char_range}", &parts.style.char_range),
        format = FORMAT_RULES,
        style = style_section(parts.style),
        guidelines = parts.guidelines,
        ng = parts.ng_expressions,
        trend_section = trend_section,
        persona = parts.persona,
        feedback = parts.feedback,
        output = OUTPUT_RULES,
    )
}

/// Bullet list of trend titles
pub fn trend_lines(trends: &[TrendItem]) -> String {
    trends
        .iter()
        .map(|t| format!("- {}", t.title))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The single best trend with its suggested angle
pub fn best_trend_line(best: &TrendAngle) -> String {
    format!("- {}\n  (suggested angle: {})", best.trend, best.angle)
}

pub fn promotion_prompt(article: &NoteArticle, style: &PromotionStyle, persona: &str) -> String {
    let summary = if article.summary.trim().is_empty() {
        "(infer it from the title)"
    } else {
        article.summary.as_str()
    };
    format!(
        "You are the following persona.\n{persona}\n\n---\n\
         Write a post introducing the article below.\n\n\
         Title: {title}\nSummary: {summary}\nURL: {url}\n\n\
         Promotion style \"{style_name}\":\n{style_prompt}\n\n\
         Rules:\n\
         - 80 to 200 characters\n\
         - Place the URL naturally in the text or at the end\n\
         - Do not push the reader to read it\n\
         - No hashtags\n\
         - Return only the post, without notes\n\n\
         Line breaks:\n\
         - One sentence per line\n\
         - Two to four blocks with a blank line between them\n\
         - A blank line before and after the URL\n\
         - The closing remark stands alone after a blank line\n",
        persona = persona,
        title = article.title,
        summary = summary,
        url = article.url,
        style_name = style.name,
        style_prompt = style.prompt,
    )
}

pub fn trend_analysis_prompt(trends: &[String], persona: &str) -> String {
    let list = trends
        .iter()
        .map(|t| format!("- {}", t))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "## Task\n\
         Rate how well each trend below would perform if the persona posted about it, \
         and return the top 3 with scores.\n\n\
         ## Criteria (1 to 10 each)\n\
         1. Fit: it sounds natural coming from this person\n\
         2. Relatability: many readers will nod along\n\
         3. Originality: the persona can bring a distinct angle\n\n\
         ## Persona\n{persona}\n\n\
         ## Trends\n{list}\n\n\
         ## Output (a JSON array only, no explanation)\n\
         [\n  {{\"trend\": \"word\", \"angle\": \"the angle that works (under 20 words)\", \"score\": 8}}\n]\n\
         Top 3 only. score is the integer average of the three criteria.\n",
        persona = persona,
        list = list,
    )
}

pub fn persona_prompt(persona: &Persona) -> String {
    fn or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
        if value.trim().is_empty() {
            fallback
        } else {
            value
        }
    }
    let first_person = or(&persona.first_person, "infer from gender and personality");
    let speech_style = or(&persona.speech_style, "infer from personality");

    format!(
        "Write a persona description for a social media auto-posting bot from the details below.\n\n\
         ## Details\n\
         - Gender: {gender}\n- Age: {age}\n- Occupation: {occupation}\n- Background: {background}\n\
         - Hobbies: {hobbies}\n- Personality: {personality}\n- First person: {first_person}\n\
         - Speech style: {speech_style}\n- Other: {other}\n\n\
         ## Output format\n\
         Start with: \"You are an individual posting monologues on social media. Become the person below \
         and put their inner voice into words.\"\n\n\
         ## Profile\n(5 to 8 bullets with concrete episodes and numbers)\n\n\
         ## Voice\n(4 to 6 bullets: first person, tone, sentence endings, habits)\n\n\
         ## Hard rules\n\
         - Always refer to yourself as \"{first_person}\"\n\
         - Follow the speech style \"{speech_style}\"\n\n\
         ## Sample lines\n(3 to 5 realistic example posts)\n",
        gender = or(&persona.gender, "unspecified"),
        age = persona.age,
        occupation = persona.occupation,
        background = or(&persona.background, "none"),
        hobbies = persona.hobbies,
        personality = persona.personality,
        first_person = first_person,
        speech_style = speech_style,
        other = or(&persona.other, "none"),
    )
}

pub fn keyword_prompt(persona_info: &str) -> String {
    format!(
        "## Task\n\
         Suggest five search keywords this persona should use to collect trend news for their posts.\n\n\
         ## Persona\n{}\n\n\
         ## Rules\n\
         - Each keyword is one to three words\n\
         - Base them on the occupation, hobbies and interests\n\
         - Avoid generic words such as \"news\"\n\n\
         ## Output\nOne keyword per line. No numbering, explanations or symbols.\n",
        persona_info
    )
}

pub fn engagement_prompt(history: &[HistoryEntry], overview: &[DailyOverview]) -> String {
    let posts = history
        .iter()
        .filter_map(|h| h.engagement.as_ref().map(|e| (h, e)))
        .map(|(h, e)| {
            format!(
                "[{}] chars:{} imp:{} likes:{} rt:{} eng:{} text: {}",
                h.timestamp,
                h.char_count,
                e.impressions,
                e.likes,
                e.retweets,
                e.engagement,
                truncate_chars(&h.text, 60)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let daily = if overview.is_empty() {
        String::new()
    } else {
        let lines = overview
            .iter()
            .take(14)
            .map(|d| {
                format!(
                    "[{}] imp:{} likes:{} eng:{} posts:{} follows:{} unfollows:{} net:{:+}",
                    d.date,
                    d.impressions,
                    d.likes,
                    d.engagement,
                    d.posts_created,
                    d.new_follows,
                    d.unfollows,
                    d.new_follows as i64 - d.unfollows as i64
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!("## Daily account overview\n{}", lines)
    };

    format!(
        "## Task\n\
         Below is past post data from X. Analyse the engagement trends (likes, reposts, impressions) \
         and give five concrete pieces of advice for the next posts.\n\n\
         ## Posts\n{posts}\n\n{daily}\n\n\
         ## Rules\n\
         - Point out what separates posts that performed from those that did not\n\
         - Look at style, trend type, posting time and length\n\
         - With daily data, also look at weekday patterns and follower changes\n\
         - No abstract advice; back every point with numbers\n\n\
         ## Output\nOne numbered piece of advice per line, each under 80 characters.\n",
        posts = posts,
        daily = daily,
    )
}

/// First `max` characters of `text`
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> WritingStyle {
        WritingStyle {
            name: "Hook".to_string(),
            weight: 1,
            char_range: "80-140 characters".to_string(),
            description: "One line".to_string(),
            structure: "hook -> remark".to_string(),
            example: "Sample".to_string(),
        }
    }

    #[test]
    fn test_post_prompt_with_trends() {
        let style = style();
        let parts = PostPromptParts {
            style: &style,
            persona: "A tired engineer",
            guidelines: "Be brief",
            ng_expressions: "- hashtags",
            feedback: "",
        };
        let prompt = post_prompt(&parts, Some("- Rust 2.0"));
        assert!(prompt.contains("Pick one trend"));
        assert!(prompt.contains("- Rust 2.0"));
        assert!(prompt.contains("Stay within 80-140 characters"));
        assert!(prompt.contains("A tired engineer"));
        assert!(!prompt.contains("{char_range}"));
    }

    #[test]
    fn test_post_prompt_without_trends() {
        let style = style();
        let parts = PostPromptParts {
            style: &style,
            persona: "p",
            guidelines: "",
            ng_expressions: "",
            feedback: "## Past posts",
        };
        let prompt = post_prompt(&parts, None);
        assert!(prompt.contains("There is no trend input"));
        assert!(!prompt.contains("### Trends"));
        assert!(prompt.contains("## Past posts"));
    }

    #[test]
    fn test_promotion_prompt_mentions_article() {
        let article = NoteArticle {
            url: "https://note.com/me/n/abc".to_string(),
            title: "On estimates".to_string(),
            summary: String::new(),
        };
        let prompt = promotion_prompt(&article, &PromotionStyle::understated(), "persona");
        assert!(prompt.contains("On estimates"));
        assert!(prompt.contains("https://note.com/me/n/abc"));
        assert!(prompt.contains("infer it from the title"));
    }

    #[test]
    fn test_persona_prompt_fills_defaults() {
        let persona = Persona {
            age: "42".to_string(),
            ..Default::default()
        };
        let prompt = persona_prompt(&persona);
        assert!(prompt.contains("- Age: 42"));
        assert!(prompt.contains("- Gender: unspecified"));
        assert!(prompt.contains("infer from personality"));
    }

    #[test]
    fn test_truncate_chars_is_char_based() {
        assert_eq!(truncate_chars("日本語のテキスト", 3), "日本語");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }
}
