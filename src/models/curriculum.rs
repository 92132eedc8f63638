// src/models/curriculum.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChapterItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "titleBn")]
    pub title_bn: String,
}

#[derive(Debug, Deserialize)]
pub struct CurriculumUpdate {
    pub class_level: String,
    pub group_name: String,
    pub subject: String,
    pub chapters: Vec<ChapterItem>,
}

#[derive(Debug, Deserialize)]
pub struct CurriculumQuery {
    pub class_level: String,
    pub group_name: String,
}

#[derive(Debug, Deserialize)]
pub struct BookContentUpload {
    pub class_level: String,
    pub subject: String,
    pub chapter_id: String,
    pub text_content: String,
}
