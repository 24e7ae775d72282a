use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::domain::Record;
use crate::locale::{self, Language};

pub const AUTOPLAY_INTERVAL: Duration = Duration::from_millis(5000);

pub const HERO_PAGE: &str = "home";
pub const HERO_SECTION: &str = "hero";

#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    pub title: String,
    pub subtitle: String,
    pub description: String,
}

impl Slide {
    pub fn from_section(section: &Record, lang: Language) -> Self {
        Slide {
            title: section.localized("title", lang),
            subtitle: section.localized("subtitle", lang),
            description: section.localized("content", lang),
        }
    }
}

// Built-in slides, used until the content api delivers hero sections.
const FALLBACK: [[(&str, &str); 6]; 3] = [
    [
        ("title_uz", "Sog'lom hayot sari"),
        ("title_ru", "К здоровой жизни"),
        ("subtitle_uz", "Tabiiy va samarali dori vositalari"),
        ("subtitle_ru", "Натуральные и эффективные лекарственные средства"),
        ("content_uz", "Bizning mahsulotlarimiz sizning sog'lig'ingizni mustahkamlashga yordam beradi."),
        ("content_ru", "Наша продукция помогает укреплять ваше здоровье."),
    ],
    [
        ("title_uz", "Yuqori sifat"),
        ("title_ru", "Высокое качество"),
        ("subtitle_uz", "Xalqaro standartlarga mos"),
        ("subtitle_ru", "Соответствие международным стандартам"),
        ("content_uz", "GMP standartlari asosida ishlab chiqarilgan xavfsiz mahsulotlar."),
        ("content_ru", "Безопасная продукция, произведённая по стандартам GMP."),
    ],
    [
        ("title_uz", "Innovatsion yechimlar"),
        ("title_ru", "Инновационные решения"),
        ("subtitle_uz", "Zamonaviy texnologiyalar"),
        ("subtitle_ru", "Современные технологии"),
        ("content_uz", "Eng so'nggi texnologiyalar yordamida yaratilgan samarali formulalar."),
        ("content_ru", "Эффективные формулы, созданные с помощью новейших технологий."),
    ],
];

pub fn fallback_slides(lang: Language) -> Vec<Slide> {
    FALLBACK
        .iter()
        .map(|fields| {
            let entity: HashMap<String, String> = fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Slide {
                title: locale::resolve(&entity, "title", lang),
                subtitle: locale::resolve(&entity, "subtitle", lang),
                description: locale::resolve(&entity, "content", lang),
            }
        })
        .collect()
}

/// Active hero sections of the home page in display order.
pub fn hero_sections(sections: &[Record]) -> Vec<&Record> {
    let mut hero: Vec<&Record> = sections
        .iter()
        .filter(|s| s.text("page_path").as_deref() == Some(HERO_PAGE))
        .filter(|s| s.text("section_key").as_deref() == Some(HERO_SECTION))
        .filter(|s| s.flag("is_active").unwrap_or(true))
        .collect();
    hero.sort_by_key(|s| s.number("order").unwrap_or_default());
    hero
}

/// Promotional slides advancing on a fixed interval.
///
/// The autoplay timer belongs to the slide list: it restarts when the number
/// of slides changes and is left alone by manual navigation.
#[derive(Debug)]
pub struct Carousel {
    slides: Vec<Slide>,
    index: usize,
    interval: Duration,
    timer_start: Instant,
    fired: u128,
}

impl Carousel {
    pub fn new(slides: Vec<Slide>, interval: Duration, now: Instant) -> Self {
        Carousel {
            slides,
            index: 0,
            interval,
            timer_start: now,
            fired: 0,
        }
    }

    pub fn with_fallback(lang: Language, interval: Duration, now: Instant) -> Self {
        Self::new(fallback_slides(lang), interval, now)
    }

    /// Use the hero sections when there are any, the built-in slides otherwise.
    pub fn load_sections(&mut self, sections: &[Record], lang: Language, now: Instant) {
        let hero = hero_sections(sections);
        let slides = if hero.is_empty() {
            fallback_slides(lang)
        } else {
            hero.into_iter().map(|s| Slide::from_section(s, lang)).collect()
        };
        self.set_slides(slides, now);
    }

    pub fn set_slides(&mut self, slides: Vec<Slide>, now: Instant) {
        if slides.len() != self.slides.len() {
            debug!(
                "Carousel slide count {} -> {}, restarting autoplay",
                self.slides.len(),
                slides.len()
            );
            self.timer_start = now;
            self.fired = 0;
        }
        self.slides = slides;
        if self.index >= self.slides.len() {
            self.index = 0;
        }
    }

    /// Advance once for every interval that elapsed since the last tick.
    pub fn tick(&mut self, now: Instant) -> bool {
        let interval = self.interval.as_millis().max(1);
        let due = now.saturating_duration_since(self.timer_start).as_millis() / interval;
        let mut moved = false;
        while self.fired < due {
            self.fired += 1;
            self.next();
            moved = true;
        }
        if moved {
            trace!("Carousel autoplay at slide {}", self.index);
        }
        moved
    }

    pub fn next(&mut self) {
        if !self.slides.is_empty() {
            self.index = (self.index + 1) % self.slides.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.slides.is_empty() {
            self.index = (self.index + self.slides.len() - 1) % self.slides.len();
        }
    }

    pub fn select(&mut self, index: usize) {
        if index < self.slides.len() {
            self.index = index;
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn current(&self) -> Option<&Slide> {
        self.slides.get(self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slides(n: usize) -> Vec<Slide> {
        (0..n)
            .map(|i| Slide {
                title: format!("slide {i}"),
                subtitle: String::new(),
                description: String::new(),
            })
            .collect()
    }

    #[test]
    fn six_slides_wrap_after_thirty_seconds() {
        let start = Instant::now();
        let mut c = Carousel::new(slides(6), AUTOPLAY_INTERVAL, start);
        let mut advances = 0;
        for ms in (100..=30_000).step_by(100) {
            if c.tick(start + Duration::from_millis(ms)) {
                advances += 1;
            }
        }
        assert_eq!(advances, 6);
        assert_eq!(c.index(), 0);
    }

    #[test]
    fn late_tick_catches_up() {
        let start = Instant::now();
        let mut c = Carousel::new(slides(4), AUTOPLAY_INTERVAL, start);
        c.tick(start + Duration::from_millis(15_500));
        assert_eq!(c.index(), 3);
    }

    #[test]
    fn manual_navigation_keeps_timer() {
        let start = Instant::now();
        let mut c = Carousel::new(slides(3), AUTOPLAY_INTERVAL, start);
        c.tick(start + Duration::from_millis(4_000));
        c.prev();
        assert_eq!(c.index(), 2);
        c.select(1);
        assert_eq!(c.index(), 1);
        // timer still fires at 5s, not 5s after the click
        assert!(c.tick(start + Duration::from_millis(5_000)));
        assert_eq!(c.index(), 2);
        c.next();
        assert_eq!(c.index(), 0);
        c.select(7);
        assert_eq!(c.index(), 0);
    }

    #[test]
    fn new_slide_count_restarts_timer() {
        let start = Instant::now();
        let mut c = Carousel::new(slides(3), AUTOPLAY_INTERVAL, start);
        let later = start + Duration::from_millis(4_000);
        c.set_slides(slides(5), later);
        assert!(!c.tick(start + Duration::from_millis(6_000)));
        assert!(c.tick(later + Duration::from_millis(5_000)));

        // same count, timer untouched
        let mut d = Carousel::new(slides(3), AUTOPLAY_INTERVAL, start);
        d.set_slides(slides(3), later);
        assert!(d.tick(start + Duration::from_millis(5_000)));
    }

    #[test]
    fn fallback_slides_are_bilingual() {
        let uz = fallback_slides(Language::Uz);
        let ru = fallback_slides(Language::Ru);
        let en = fallback_slides(Language::En);
        assert_eq!(uz.len(), 3);
        assert_eq!(uz[0].title, "Sog'lom hayot sari");
        assert_eq!(ru[1].title, "Высокое качество");
        assert_eq!(en[2].title, "Innovatsion yechimlar");
    }

    #[test]
    fn hero_sections_replace_fallback() {
        let sections: Vec<Record> = [
            json!({"id": 1, "page_path": "home", "section_key": "about", "title_uz": "Biz"}),
            json!({"id": 2, "page_path": "home", "section_key": "hero", "order": 2, "title_uz": "Ikkinchi", "title_ru": "Второй"}),
            json!({"id": 3, "page_path": "home", "section_key": "hero", "order": 1, "title_uz": "Birinchi", "title_ru": ""}),
            json!({"id": 4, "page_path": "home", "section_key": "hero", "order": 0, "is_active": false, "title_uz": "Off"}),
        ]
        .into_iter()
        .filter_map(Record::from_value)
        .collect();

        let start = Instant::now();
        let mut c = Carousel::with_fallback(Language::Ru, AUTOPLAY_INTERVAL, start);
        c.load_sections(&sections, Language::Ru, start);
        assert_eq!(c.len(), 2);
        assert_eq!(c.current().map(|s| s.title.as_str()), Some("Birinchi"));
        c.next();
        assert_eq!(c.current().map(|s| s.title.as_str()), Some("Второй"));

        c.load_sections(&[], Language::Uz, start);
        assert_eq!(c.len(), 3);
    }
}
