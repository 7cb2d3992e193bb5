/// System message for job extraction. Composition framing follows further down.
pub const EXTRACT_SYSTEM: &str = "You extract job postings from scraped career pages. \
You reply with valid JSON only, never with prose or markdown.";

const EXTRACT_PROMPT_TEMPLATE: &str = r#"### SCRAPED TEXT FROM WEBSITE:
{page_text}
### INSTRUCTION:
The scraped text is from the careers page of a website.
Extract every job posting it contains and return them as a JSON list of objects.
Each object must have exactly these keys:
- "role": the job title (string)
- "experience": required experience (string, or null when not stated)
- "skills": required skills (list of strings, one skill per entry)
- "description": a short summary of the job (string)
Return [] when the text holds no job posting.
Only return the valid JSON list.
### VALID JSON (NO PREAMBLE):"#;

pub const COMPOSE_SYSTEM: &str = "You write concise, personalized cold emails. \
You reply with the email text only.";

const COMPOSE_PROMPT_TEMPLATE: &str = r#"### JOB DESCRIPTION:
{job_json}

### INSTRUCTION:
You are {sender_name}, a business development executive at {sender_company}.
{sender_company} builds custom software and AI solutions that help businesses automate
processes, cut costs and scale.
Write a cold email to the client about the job above, describing how {sender_company} can
fulfil their needs. Add the most relevant of these portfolio links to showcase past work:
{link_list}
Remember you are {sender_name}, BDE at {sender_company}.
Do not provide a preamble.
### EMAIL (NO PREAMBLE):"#;

pub fn extract_prompt(page_text: &str) -> String {
    EXTRACT_PROMPT_TEMPLATE.replace("{page_text}", page_text)
}

pub fn compose_prompt(job_json: &str, links: &[String], sender_name: &str, sender_company: &str) -> String {
    let link_list = if links.is_empty() {
        "(no matching portfolio links)".to_string()
    } else {
        links
            .iter()
            .map(|l| format!("- {l}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    // Job text is substituted last so placeholders inside it are left alone.
    COMPOSE_PROMPT_TEMPLATE
        .replace("{sender_name}", sender_name)
        .replace("{sender_company}", sender_company)
        .replace("{link_list}", &link_list)
        .replace("{job_json}", job_json)
}
