//! Parsing of structured multi-line admin replies.
//!
//! Fields are positional, one per line, optionally prefixed with the numbered
//! template the bot asked for (`1) `, `2) `, ...). Parse failures are
//! `Error::Validation` and the caller answers with a format-error message
//! without re-arming the continuation.

use std::sync::OnceLock;

use regex::Regex;

use crate::{
    catalog::{Lesson, Merch},
    domain::LessonNumber,
    errors::Error,
    Result,
};

fn field_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\)\s*").expect("static regex"))
}

/// Split a reply into positional fields, stripping numeric prefixes.
pub fn split_fields(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| field_prefix().replace(line, "").trim().to_string())
        .collect()
}

/// Parse the 5-field lesson form:
/// playlist / lesson number / video URL / description / has sub-lessons (да/нет).
pub fn parse_lesson_form(text: &str, image_path: &str) -> Result<Lesson> {
    let fields = split_fields(text);
    if fields.len() < 5 {
        return Err(Error::Validation(format!(
            "expected 5 lesson fields, got {}",
            fields.len()
        )));
    }

    let lesson_number = fields[1]
        .parse::<i64>()
        .map_err(|_| Error::Validation(format!("invalid lesson number: {:?}", fields[1])))?;

    Ok(Lesson {
        playlist: fields[0].clone(),
        lesson_number: LessonNumber(lesson_number),
        video_url: fields[2].clone(),
        description: fields[3].clone(),
        image_path: Some(image_path.to_string()),
        has_sub_lessons: fields[4].to_lowercase() == "да",
        sub_lessons: Vec::new(),
    })
}

/// Parse the 3-field merch form: name / price / description.
pub fn parse_merch_form(text: &str, images: Vec<String>) -> Result<Merch> {
    let fields = split_fields(text);
    if fields.len() < 3 {
        return Err(Error::Validation(format!(
            "expected 3 merch fields, got {}",
            fields.len()
        )));
    }

    let price = fields[1]
        .parse::<f64>()
        .map_err(|_| Error::Validation(format!("invalid price: {:?}", fields[1])))?;

    Ok(Merch {
        name: fields[0].clone(),
        price,
        description: fields[2].clone(),
        images,
    })
}
