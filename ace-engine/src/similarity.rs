//! 内容相似度计算
//!
//! 供 Curator 实现做近重复去重：在构造 Delta 前检测新内容是否与
//! 已有 bullet 近似重复，命中时改为 `update`（标签并集）而不是 `add`。
//! Playbook 本身不做任何隐式合并，去重是 Curator 层的可选策略。

use crate::playbook::Bullet;
use crate::playbook::Playbook;
use std::collections::HashMap;

/// 归一化内容（用于提高相似度计算准确性）
///
/// 转换为小写、移除标点、压缩多余空白。中日韩字符保留。
pub fn normalize_content(text: &str) -> String {
    let filtered: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || is_cjk(*c))
        .collect();
    let words: Vec<&str> = filtered.split_whitespace().collect();
    words.join(" ")
}

/// 计算 Levenshtein 编辑距离
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let chars1: Vec<char> = s1.chars().collect();
    let chars2: Vec<char> = s2.chars().collect();
    let len1 = chars1.len();
    let len2 = chars2.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0usize; len2 + 1]; len1 + 1];
    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    for (i, c1) in chars1.iter().enumerate() {
        for (j, c2) in chars2.iter().enumerate() {
            let cost = usize::from(c1 != c2);
            matrix[i + 1][j + 1] = (matrix[i][j + 1] + 1)
                .min(matrix[i + 1][j] + 1)
                .min(matrix[i][j] + cost);
        }
    }

    matrix[len1][len2]
}

/// 基于编辑距离的相似度分数，范围 0.0（完全不同）- 1.0（完全相同）
pub fn similarity_score(s1: &str, s2: &str) -> f32 {
    let distance = levenshtein_distance(s1, s2) as f32;
    let max_len = s1.chars().count().max(s2.chars().count()) as f32;
    if max_len == 0.0 {
        return 1.0;
    }
    1.0 - (distance / max_len)
}

/// 计算 N-gram 相似度，范围 0.0 - 1.0
pub fn ngram_similarity(s1: &str, s2: &str, n: usize) -> f32 {
    let ngrams1 = extract_ngrams(s1, n);
    let ngrams2 = extract_ngrams(s2, n);

    if ngrams1.is_empty() && ngrams2.is_empty() {
        return 1.0;
    }
    if ngrams1.is_empty() || ngrams2.is_empty() {
        return 0.0;
    }

    let mut intersection = 0;
    let mut total = 0;
    for (gram, count1) in &ngrams1 {
        if let Some(count2) = ngrams2.get(gram) {
            intersection += count1.min(count2);
        }
        total += count1;
    }
    for (gram, count2) in &ngrams2 {
        if !ngrams1.contains_key(gram) {
            total += count2;
        }
    }

    if total == 0 {
        return 0.0;
    }
    intersection as f32 / total as f32
}

fn extract_ngrams(text: &str, n: usize) -> HashMap<String, usize> {
    let mut ngrams = HashMap::new();
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < n {
        return ngrams;
    }
    for i in 0..=chars.len() - n {
        let gram: String = chars[i..i + n].iter().collect();
        *ngrams.entry(gram).or_insert(0) += 1;
    }
    ngrams
}

/// 组合相似度：40% 编辑距离 + 30% 2-gram + 30% 3-gram
pub fn combined_similarity(s1: &str, s2: &str) -> f32 {
    let lev_score = similarity_score(s1, s2);
    let bigram_score = ngram_similarity(s1, s2, 2);
    let trigram_score = ngram_similarity(s1, s2, 3);
    lev_score * 0.4 + bigram_score * 0.3 + trigram_score * 0.3
}

/// 两段内容是否近似重复（先归一化再比较）
///
/// `threshold` 推荐 0.85。归一化后完全相等直接命中。
pub fn is_near_duplicate(s1: &str, s2: &str, threshold: f32) -> bool {
    let n1 = normalize_content(s1);
    let n2 = normalize_content(s2);
    if n1 == n2 {
        return true;
    }
    combined_similarity(&n1, &n2) >= threshold
}

/// 在 playbook 中查找与给定内容近似重复的 bullet
///
/// 返回第一个命中的 bullet（按插入顺序）。
pub fn find_near_duplicate<'a>(
    playbook: &'a Playbook,
    content: &str,
    threshold: f32,
) -> Option<&'a Bullet> {
    playbook
        .iter()
        .find(|bullet| is_near_duplicate(&bullet.content, content, threshold))
}

/// 检查是否是中日韩（CJK）字符
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |  // CJK Unified Ideographs
        '\u{3400}'..='\u{4DBF}' |  // CJK Extension A
        '\u{20000}'..='\u{2A6DF}' | // CJK Extension B
        '\u{F900}'..='\u{FAFF}'    // CJK Compatibility Ideographs
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::Delta;

    #[test]
    fn test_normalize_content() {
        assert_eq!(normalize_content("Hello,  World!"), "hello world");
        assert_eq!(
            normalize_content("Use OFFICIAL   GTV criteria."),
            "use official gtv criteria"
        );
        // 中文字符保留
        assert_eq!(normalize_content("使用 Rust！"), "使用 rust");
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("hello", "hello"), 0);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "hello"), 5);
        assert_eq!(levenshtein_distance("hello", ""), 5);
    }

    #[test]
    fn test_similarity_score() {
        assert_eq!(similarity_score("hello", "hello"), 1.0);
        let score = similarity_score("hello", "hallo");
        assert!(score > 0.6 && score < 1.0);
    }

    #[test]
    fn test_ngram_similarity() {
        assert_eq!(ngram_similarity("hello", "hello", 2), 1.0);
        assert!(ngram_similarity("hello", "hallo", 2) > 0.3);
        assert!(ngram_similarity("hello", "world", 2) < 0.3);
    }

    #[test]
    fn test_is_near_duplicate_normalized_match() {
        // 大小写/标点/空白差异归一化后视为重复
        assert!(is_near_duplicate(
            "Use official GTV criteria wording",
            "use  official gtv criteria wording!",
            0.85
        ));
        assert!(!is_near_duplicate(
            "Use official GTV criteria wording",
            "Cite specific endorsing body",
            0.85
        ));
    }

    #[test]
    fn test_find_near_duplicate_in_playbook() {
        let mut playbook = Playbook::new();
        let delta = Delta {
            add: vec![
                "Use official GTV criteria wording".to_string(),
                "Cite specific endorsing body".to_string(),
            ],
            ..Delta::default()
        };
        playbook.apply_delta(&delta).unwrap();

        let hit = find_near_duplicate(&playbook, "use official GTV criteria wording.", 0.85);
        assert_eq!(hit.map(|b| b.id.as_str()), Some("b1"));

        let miss = find_near_duplicate(&playbook, "Completely unrelated advice", 0.85);
        assert!(miss.is_none());
    }
}
