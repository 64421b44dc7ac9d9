//! Prompt templates for the two analysis stages.
//!
//! The scoring rubric lives entirely in these instructions. Pipeline code
//! treats the model output as opaque structured data: it validates the
//! shape and persists it, nothing more.

use crate::analyzer::schemas::VacancyFacts;
use crate::types::Vacancy;

pub const STAGE1_SYSTEM_PROMPT: &str = "\
You are an expert data engineer extracting structured data from job \
descriptions with extreme precision.

Rules:
1. Tech stack: list every language, framework, database and tool. Use \
canonical names ('PostgreSQL' not 'postgres', 'Python' not 'python3').
2. Grade: infer seniority from title and requirements. Exactly one of: \
intern, junior, middle, senior, lead, principal.
3. Domain: the company's business area (FinTech, Crypto, E-commerce, \
Gamedev, EdTech, ...). Null if unclear.
4. Salary: extract numbers exactly as written. Never convert currencies; \
keep the original currency code. Note gross vs net. Null if absent.
5. Benefits: tangible assets only (insurance, equity, hardware, relocation, \
education budget). Drop noise like 'friendly team' or 'cookies'.
6. Red flag keywords: concerning phrases ('stress resistance', 'overtime', \
'unpaid', 'family atmosphere', 'wear many hats', 'fast-paced'). List them \
verbatim, no interpretation.
7. Stay neutral. Extract facts only; judgment happens elsewhere. If a fact \
cannot be determined, leave the field null or empty - never guess.

Return data in the exact JSON schema provided.";

pub const STAGE2_SYSTEM_PROMPT: &str = "\
You are a cynical, highly experienced IT professional who protects \
colleagues from toxic employers. You receive extracted facts plus the \
original posting text and deliver a verdict.

Source-of-truth rule: the 'Compensation (system of record)' line comes \
from verified data and always wins over any salary mentioned in prose. \
When they conflict, trust the record and flag the contradiction.

Consistency checks: contradictions between facts and text (modern stack \
advertised but legacy maintenance described, grade vs required experience \
mismatch, salary vs seniority mismatch) lower the score and belong in \
red_flags.

Trust score (1-10, integers only - 0 is reserved by the system for \
technical failures and must never be produced by you):
1-3: toxic waste, major red flags. 4-5: concerning, multiple warnings. \
6-7: standard corporate vagueness. 8-9: decent, minor concerns. 10: rare, \
transparent, honest.
Scoring modifiers: untracked compensation is neutral, not a penalty. \
Premium pay offsets legacy technology. Manipulative language patterns \
('family', 'rockstar', 'wear many hats') are penalized hard.

red_flags: concrete, specific concerns.
toxic_phrases: verbatim quotes from the original text only.
honest_summary: rewrite the posting into plain language revealing what it \
really means.
verdict: exactly one of 'Safe', 'Risky', 'Avoid'.

Be brutally honest. Job seekers deserve the truth.";

/// Curated judgment examples appended to the Stage-2 instruction.
/// Extend as new toxic patterns show up in the wild.
pub const STAGE2_FEW_SHOTS: &str = "\
<EXAMPLES_OF_CORRECT_ANALYSIS>

Example 1: The legacy trap
Input: 'Main stack: Python 3.11. Tasks: maintenance of existing code base \
written in Twisted and Python 2.7.' Salary: not specified.
Analysis: trust_score 3; red flag 'Bait & switch: title says Python 3.11, \
reality is Python 2.7 legacy'; verdict Avoid.

Example 2: The legacy trap, premium pay edition
Input: 'Stack: Python 2.7, Twisted.' Compensation (system of record): \
7000 USD (net).
Analysis: trust_score 6; red flag 'Legacy stack (Python 2.7 is EOL)'; \
honest_summary 'Old unpleasant code, but they pay well above market to \
compensate - an honest trade'; verdict Risky. Premium pay offsets the \
legacy penalty; do not score this below 6.

Example 3: The burnout factory
Input: 'We are a rocket-ship startup! Rockstars willing to wear many hats, \
fast-paced dynamic environment. Pizza on Fridays!'
Analysis: trust_score 2; toxic_phrases ['rockstars willing to wear many \
hats', 'fast-paced dynamic environment']; red flag 'Pizza as a benefit \
substitute'; verdict Avoid.

Example 4: The good galley
Input: 'Stack: FastAPI, PostgreSQL, AWS. Salary: $4000-5000 net. Paid sick \
leave, overtime paid x2, health insurance.'
Analysis: trust_score 9; honest_summary 'Transparent offer with clear \
rules, market salary and real benefits'; verdict Safe.

Example 5: The salary dodge
Input: 'Competitive salary based on experience. Senior position.'
Analysis: trust_score 5; red flag \"'Competitive salary' without numbers = \
below market\"; verdict Risky. Note: a salary absent from both prose and \
the system of record is neutral; hiding it behind buzzwords is not.

</EXAMPLES_OF_CORRECT_ANALYSIS>";

pub fn format_stage1_prompt(vacancy: &Vacancy) -> String {
    format!(
        "Extract structured data from this job vacancy:\n\n\
         **Title:** {title}\n\
         **Company:** {company}\n\n\
         **Full description:**\n{description}\n\n\
         Extract all relevant information following the schema.",
        title = vacancy.title,
        company = vacancy.company_name,
        description = vacancy.description,
    )
}

pub fn format_stage2_prompt(vacancy: &Vacancy, facts: &VacancyFacts) -> String {
    let tech_stack = if facts.tech_stack.is_empty() {
        "not specified".to_string()
    } else {
        facts.tech_stack.join(", ")
    };
    let benefits = if facts.benefits.is_empty() {
        "none mentioned".to_string()
    } else {
        facts.benefits.join(", ")
    };
    let red_flag_keywords = if facts.red_flag_keywords.is_empty() {
        "none detected".to_string()
    } else {
        facts.red_flag_keywords.join(", ")
    };
    let grade = facts
        .grade
        .map(|g| format!("{g:?}"))
        .unwrap_or_else(|| "not specified".to_string());
    let domain = facts.domain.as_deref().unwrap_or("not specified");

    format!(
        "Analyze this vacancy for trust and toxicity:\n\n\
         **Title:** {title}\n\
         **Company:** {company}\n\n\
         **Compensation (system of record):** {financial}\n\n\
         **Extracted facts:**\n\
         - Tech stack: {tech_stack}\n\
         - Grade: {grade}\n\
         - Domain: {domain}\n\
         - Salary mentioned in text: {salary_text}\n\
         - Benefits: {benefits}\n\
         - Red flag keywords: {red_flag_keywords}\n\n\
         **Original description:**\n{description}\n\n\
         Remember: the system-of-record compensation above outranks any \
         figure in the text.",
        title = vacancy.title,
        company = vacancy.company_name,
        financial = vacancy.financial_summary(),
        salary_text = facts.salary_summary(),
        benefits = benefits,
        red_flag_keywords = red_flag_keywords,
        description = vacancy.description,
        tech_stack = tech_stack,
        grade = grade,
        domain = domain,
    )
}

/// Stage-2 instruction with few-shot examples appended.
pub fn stage2_instruction() -> String {
    format!("{STAGE2_SYSTEM_PROMPT}\n\n{STAGE2_FEW_SHOTS}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::schemas::{SalaryFacts, VacancyGrade};

    #[test]
    fn stage2_prompt_carries_record_salary_over_prose() {
        let mut vacancy = crate::testing::sample_vacancy();
        vacancy.salary_from = Some(7000.0);
        vacancy.salary_currency = Some("USD".into());
        vacancy.description = "We pay 500 USD. Honest.".into();

        let facts = VacancyFacts {
            grade: Some(VacancyGrade::Senior),
            salary: Some(SalaryFacts {
                min: Some(500),
                max: None,
                currency: Some("USD".into()),
                is_gross: false,
            }),
            ..Default::default()
        };

        let prompt = format_stage2_prompt(&vacancy, &facts);
        assert!(prompt.contains("Compensation (system of record):** from 7000 USD (net)"));
        assert!(prompt.contains("Salary mentioned in text: from 500 USD"));
        assert!(prompt.contains("outranks"));
    }

    #[test]
    fn stage1_prompt_includes_all_raw_fields() {
        let vacancy = crate::testing::sample_vacancy();
        let prompt = format_stage1_prompt(&vacancy);
        assert!(prompt.contains(&vacancy.title));
        assert!(prompt.contains(&vacancy.company_name));
        assert!(prompt.contains(&vacancy.description));
    }

    #[test]
    fn stage2_instruction_is_few_shot_enriched() {
        let instruction = stage2_instruction();
        assert!(instruction.contains("EXAMPLES_OF_CORRECT_ANALYSIS"));
        assert!(instruction.starts_with(STAGE2_SYSTEM_PROMPT));
    }
}
