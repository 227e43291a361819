use crate::models::MAX_TAGS;

const DOMAIN_TAGS: &[(&str, &[&str])] = &[
    ("arxiv.org", &["Research", "Academic"]),
    ("github.com", &["Code", "Development"]),
    ("medium.com", &["Article", "Blog"]),
    ("youtube.com", &["Video"]),
    ("twitter.com", &["Social"]),
    ("x.com", &["Social"]),
    ("linkedin.com", &["Social", "Professional"]),
    ("reddit.com", &["Discussion"]),
    ("stackoverflow.com", &["Programming", "Q&A"]),
];

const KEYWORD_TAGS: &[(&str, &[&str])] = &[
    ("AI", &["ai", "artificial intelligence", "machine learning", "deep learning"]),
    ("NLP", &["nlp", "natural language", "language model", "transformer", "gpt", "llm"]),
    ("Computer Vision", &["computer vision", "image recognition", "object detection"]),
    ("Data Science", &["data science", "data analysis", "analytics"]),
    ("Python", &["python", "pytorch", "tensorflow"]),
    ("JavaScript", &["javascript", "react", "node.js", "typescript"]),
    ("Cloud", &["cloud", "aws", "azure", "gcp"]),
    ("Database", &["database", "sql", "mongodb", "postgres"]),
    ("Security", &["security", "encryption", "authentication"]),
    ("DevOps", &["devops", "docker", "kubernetes", "ci/cd"]),
    ("Tutorial", &["tutorial", "guide", "how to", "introduction"]),
    ("Research", &["research", "paper", "study", "analysis"]),
];

/// Domain tags first, then content keyword tags, capped at `MAX_TAGS`.
/// Matching is plain substring, so "x.com" also hits hosts like "dropbox.com".
pub fn auto_tag(title: &str, text: &str, domain: &str) -> Vec<String> {
    let mut tags: Vec<&str> = Vec::new();
    let mut add = |tag: &'static str| {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    };

    for (key, domain_tags) in DOMAIN_TAGS {
        if domain.contains(key) {
            for &tag in *domain_tags {
                add(tag);
            }
        }
    }

    let haystack = format!("{} {}", title, text).to_lowercase();
    for (tag, keywords) in KEYWORD_TAGS {
        if keywords.iter().any(|k| haystack.contains(k)) {
            add(*tag);
        }
    }

    tags.truncate(MAX_TAGS);
    tags.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_table_contributes_tags() {
        let tags = auto_tag("Repo", "", "github.com");
        assert!(tags.contains(&"Code".to_string()));
        assert!(tags.contains(&"Development".to_string()));
    }

    #[test]
    fn keywords_match_case_insensitively_across_title_and_body() {
        let tags = auto_tag("A Docker Tutorial", "Running PostgreSQL", "blog.example.com");
        assert!(tags.contains(&"DevOps".to_string()));
        assert!(tags.contains(&"Tutorial".to_string()));
        assert!(tags.contains(&"Database".to_string()));
    }

    #[test]
    fn never_more_than_five() {
        let text = "machine learning nlp computer vision analytics python react aws sql \
                    encryption docker tutorial research";
        let tags = auto_tag("everything", text, "linkedin.com");
        assert_eq!(tags.len(), MAX_TAGS);

        let mut unique = tags.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), tags.len());
    }

    #[test]
    fn nothing_matches() {
        assert!(auto_tag("Hello", "short note here", "example.com").is_empty());
    }
}
