//! Table columns for every admin resource.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::api::{Resource, media_url};
use crate::domain::Record;
use crate::locale::{Language, field_key, field_label};
use crate::table::Column;

/// Attributes holding uploaded file paths.
pub const MEDIA_FIELDS: &[&str] = &[
    "image",
    "icon",
    "pdf_file",
    "logo",
    "favicon",
    "background_image",
    "resume_file",
];

pub fn is_media_field(key: &str) -> bool {
    MEDIA_FIELDS.contains(&key)
}

fn badge(text: &str, color: Color) -> Line<'static> {
    Line::from(Span::styled(
        format!(" {text} "),
        Style::new().fg(Color::Black).bg(color),
    ))
}

fn muted(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::new().fg(Color::DarkGray),
    ))
}

fn active_badge(value: &str, yes: &'static str, no: &'static str) -> Line<'static> {
    if value == "true" {
        badge(yes, Color::Green)
    } else {
        badge(no, Color::Red)
    }
}

fn status_badge(value: &str) -> Line<'static> {
    let color = match value {
        "approved" | "replied" | "done" => Color::Green,
        "rejected" | "spam" => Color::Red,
        "" => return muted("-"),
        _ => Color::Yellow,
    };
    badge(value, color)
}

fn date(value: &str) -> Line<'static> {
    if value.is_empty() {
        muted("-")
    } else {
        Line::raw(value.chars().take(10).collect::<String>())
    }
}

fn timestamp(value: &str) -> Line<'static> {
    Line::raw(value.replace('T', " ").chars().take(19).collect::<String>())
}

fn capitalized(value: &str) -> Line<'static> {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => Line::raw(first.to_uppercase().chain(chars).collect::<String>()),
        None => muted("-"),
    }
}

fn media(key: &str, label: &str, base: &str, missing: &'static str) -> Column<Record> {
    let base = base.to_string();
    Column::new(key, label).render(move |value: &str, _: &Record| {
        if value.is_empty() {
            muted(missing)
        } else {
            Line::from(Span::styled(
                media_url(&base, value),
                Style::new().add_modifier(Modifier::UNDERLINED),
            ))
        }
    })
}

/// Column showing `base` in `lang`, falling back to the default language.
fn localized(base: &'static str, lang: Language) -> Column<Record> {
    Column::new(field_key(base, lang), field_label(base, lang))
        .render(move |_: &str, row: &Record| Line::raw(row.localized(base, lang)))
}

fn nested_name(row: &Record, key: &str, lang: Language) -> Line<'static> {
    row.0
        .get(key)
        .cloned()
        .and_then(Record::from_value)
        .map(|nested| nested.localized("name", lang))
        .filter(|name| !name.is_empty())
        .map(Line::raw)
        .unwrap_or_else(|| muted("-"))
}

pub fn columns_for(resource: Resource, base: &str, lang: Language) -> Vec<Column<Record>> {
    match resource {
        Resource::Products => vec![
            Column::new("id", "ID"),
            media("image", "Image", base, "No Img"),
            localized("name", lang),
            Column::new("category", "Category")
                .render(move |_: &str, row: &Record| nested_name(row, "category", lang)),
            Column::new("form", "Form").render(|v: &str, _: &Record| capitalized(v)),
            Column::new("is_active", "Status")
                .render(|v: &str, _: &Record| active_badge(v, "Active", "Inactive")),
        ],
        Resource::Categories => vec![
            Column::new("id", "ID"),
            media("icon", "Icon", base, "-"),
            localized("name", lang),
            Column::new("slug", "Slug"),
            Column::new("order", "Order"),
            Column::new("is_active", "Status")
                .render(|v: &str, _: &Record| active_badge(v, "Active", "Inactive")),
        ],
        Resource::News => vec![
            Column::new("id", "ID"),
            media("image", "Image", base, "No Img"),
            localized("title", lang),
            Column::new("published_date", "Date").render(|v: &str, _: &Record| date(v)),
            Column::new("views", "Views"),
            Column::new("is_published", "Status")
                .render(|v: &str, _: &Record| active_badge(v, "Published", "Draft")),
        ],
        Resource::Certificates => vec![
            Column::new("id", "ID"),
            media("image", "Image", base, "No Img"),
            localized("name", lang),
            Column::new("certificate_type", "Type"),
            Column::new("expiry_date", "Expires").render(|v: &str, _: &Record| date(v)),
            media("pdf_file", "PDF", base, "-"),
            Column::new("is_active", "Status")
                .render(|v: &str, _: &Record| active_badge(v, "Active", "Inactive")),
        ],
        Resource::Partners => vec![
            Column::new("id", "ID"),
            Column::new("company_name", "Company"),
            Column::new("contact_person", "Contact Person"),
            Column::new("email", "Email"),
            Column::new("country", "Country").render(|v: &str, row: &Record| {
                match row.text("city").filter(|c| !c.is_empty()) {
                    Some(city) if !v.is_empty() => Line::raw(format!("{v}, {city}")),
                    _ if v.is_empty() => muted("-"),
                    _ => Line::raw(v.to_string()),
                }
            }),
            Column::new("status", "Status").render(|v: &str, _: &Record| status_badge(v)),
        ],
        Resource::Messages => vec![
            Column::new("id", "ID"),
            Column::new("full_name", "Name"),
            Column::new("email", "Email"),
            Column::new("subject", "Subject"),
            Column::new("status", "Status").render(|v: &str, _: &Record| status_badge(v)),
            Column::new("created_at", "Received").render(|v: &str, _: &Record| date(v)),
        ],
        Resource::Content => vec![
            Column::new("id", "ID"),
            Column::new("page_path", "Page"),
            Column::new("section_key", "Section"),
            localized("title", lang),
            Column::new("order", "Order"),
            Column::new("is_active", "Status")
                .render(|v: &str, _: &Record| active_badge(v, "Active", "Inactive")),
        ],
        Resource::AuditLogs => vec![
            Column::new("id", "ID"),
            Column::new("created_at", "Time").render(|v: &str, _: &Record| timestamp(v)),
            Column::new("action", "Action").render(|v: &str, _: &Record| {
                let color = match v {
                    "create" => Color::Green,
                    "delete" => Color::Red,
                    _ => Color::Blue,
                };
                Line::from(Span::styled(v.to_string(), Style::new().fg(color)))
            }),
            Column::new("entity_type", "Entity"),
            Column::new("entity_id", "Entity ID"),
            Column::new("user_id", "User"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{DataTable, TableOptions};
    use serde_json::json;

    fn product() -> Record {
        Record::from_value(json!({
            "id": 3,
            "name_uz": "Parsilak",
            "name_ru": "",
            "image": "/uploads/images/p.png",
            "form": "tablet",
            "is_active": false,
            "category": {"id": 1, "name_uz": "Vitaminlar", "name_ru": "Витамины"},
        }))
        .unwrap()
    }

    fn cells(resource: Resource, lang: Language, row: Record) -> Vec<String> {
        let mut t = DataTable::new(
            columns_for(resource, "http://localhost:8000", lang),
            TableOptions::default(),
        );
        t.set_rows(vec![row]);
        t.view().rows[0].iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn product_row_in_russian() {
        let c = cells(Resource::Products, Language::Ru, product());
        assert_eq!(c[0], "3");
        assert_eq!(c[1], "http://localhost:8000/uploads/images/p.png");
        assert_eq!(c[2], "Parsilak");
        assert_eq!(c[3], "Витамины");
        assert_eq!(c[4], "Tablet");
        assert_eq!(c[5], " Inactive ");
    }

    #[test]
    fn localized_header_follows_language() {
        let cols = columns_for(Resource::News, "", Language::En);
        assert_eq!(cols[2].label, "Title (EN)");
        assert_eq!(cols[2].key, "title_en");
    }

    #[test]
    fn missing_media_is_marked() {
        let row = Record::from_value(json!({"id": 1, "name_uz": "A"})).unwrap();
        let c = cells(Resource::Products, Language::Uz, row);
        assert_eq!(c[1], "No Img");
        assert_eq!(c[3], "-");
    }

    #[test]
    fn audit_timestamps_are_trimmed() {
        let row = Record::from_value(json!({
            "id": 1, "created_at": "2025-01-02T03:04:05.123456", "action": "delete"
        }))
        .unwrap();
        let c = cells(Resource::AuditLogs, Language::Uz, row);
        assert_eq!(c[1], "2025-01-02 03:04:05");
        assert_eq!(c[2], "delete");
    }
}
