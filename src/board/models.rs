use serde::{Deserialize, Serialize};
use std::fmt;

/// A discovered clip. Identity is `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipRecord {
    pub name: String,
    #[serde(rename = "path")]
    pub remote_path: String,
    #[serde(rename = "thread")]
    pub thread_id: String,
    #[serde(rename = "post")]
    pub post_id: String,
}

// The listing reports post numbers as strings, thread pages as integers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PostNum {
    Number(u64),
    Text(String),
}

impl Default for PostNum {
    fn default() -> Self {
        PostNum::Number(0)
    }
}

impl fmt::Display for PostNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostNum::Number(n) => write!(f, "{}", n),
            PostNum::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileAttachment {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
    #[serde(default)]
    pub num: PostNum,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thread {
    #[serde(default)]
    pub thread_num: String,
    #[serde(default)]
    pub posts: Vec<Post>,
}

impl Thread {
    pub fn root_post(&self) -> Option<&Post> {
        self.posts.first()
    }
}

/// Body of both the listing endpoint and `res/<thread>.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardPage {
    #[serde(default)]
    pub threads: Vec<Thread>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_page_with_string_post_numbers() {
        let body = r#"{"threads":[{"thread_num":"100","posts":[
            {"comment":"WEBM thread","files":[{"path":"src/100/1.webm","name":"1.webm"}],"num":"100"}
        ]}]}"#;
        let page: BoardPage = serde_json::from_str(body).unwrap();
        let root = page.threads[0].root_post().unwrap();
        assert_eq!(page.threads[0].thread_num, "100");
        assert_eq!(root.num.to_string(), "100");
        assert_eq!(root.files[0].path, "src/100/1.webm");
    }

    #[test]
    fn test_thread_page_with_numeric_post_numbers() {
        let body = r#"{"threads":[{"posts":[
            {"comment":"op","files":[],"num":100},
            {"comment":"reply","num":101,"files":[{"path":"src/100/2.webm","name":"2.webm"}]}
        ]}]}"#;
        let page: BoardPage = serde_json::from_str(body).unwrap();
        let posts = &page.threads[0].posts;
        assert_eq!(posts[1].num, PostNum::Number(101));
        assert_eq!(posts[1].files[0].name, "2.webm");
    }

    #[test]
    fn test_clip_record_serializes_with_short_keys() {
        let clip = ClipRecord {
            name: "1.webm".to_string(),
            remote_path: "src/100/1.webm".to_string(),
            thread_id: "100".to_string(),
            post_id: "101".to_string(),
        };
        let json = serde_json::to_value(&clip).unwrap();
        assert_eq!(json["path"], "src/100/1.webm");
        assert_eq!(json["thread"], "100");
        assert_eq!(json["post"], "101");
    }
}
