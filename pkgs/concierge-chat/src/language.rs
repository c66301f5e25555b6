//! Language name and tag normalization

/// Language names (English and native) and their ISO 639-1 codes
const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("english", "en"),
    ("spanish", "es"),
    ("español", "es"),
    ("espanol", "es"),
    ("castellano", "es"),
    ("french", "fr"),
    ("français", "fr"),
    ("francais", "fr"),
    ("german", "de"),
    ("deutsch", "de"),
    ("italian", "it"),
    ("italiano", "it"),
    ("portuguese", "pt"),
    ("português", "pt"),
    ("portugues", "pt"),
    ("dutch", "nl"),
    ("nederlands", "nl"),
    ("russian", "ru"),
    ("русский", "ru"),
    ("chinese", "zh"),
    ("mandarin", "zh"),
    ("中文", "zh"),
    ("japanese", "ja"),
    ("日本語", "ja"),
    ("korean", "ko"),
    ("한국어", "ko"),
    ("arabic", "ar"),
    ("العربية", "ar"),
    ("hindi", "hi"),
    ("हिन्दी", "hi"),
    ("turkish", "tr"),
    ("türkçe", "tr"),
    ("polish", "pl"),
    ("polski", "pl"),
    ("swedish", "sv"),
    ("svenska", "sv"),
    ("norwegian", "no"),
    ("norsk", "no"),
    ("danish", "da"),
    ("dansk", "da"),
    ("finnish", "fi"),
    ("suomi", "fi"),
    ("greek", "el"),
    ("ελληνικά", "el"),
    ("hebrew", "he"),
    ("עברית", "he"),
    ("thai", "th"),
    ("ไทย", "th"),
    ("vietnamese", "vi"),
    ("tiếng việt", "vi"),
    ("indonesian", "id"),
    ("bahasa indonesia", "id"),
    ("czech", "cs"),
    ("čeština", "cs"),
    ("ukrainian", "uk"),
    ("українська", "uk"),
    ("catalan", "ca"),
    ("català", "ca"),
];

/// Normalize a language name or tag to an ISO 639-1 code.
///
/// `"English"`, `"es-ES"`, `"Français"` and `"zh_CN"` become `"en"`, `"es"`,
/// `"fr"` and `"zh"`. Empty input falls back to `"en"`; anything unknown is
/// lowercased and passed through.
pub fn normalize_language_to_code(language: &str) -> String {
    let value = language.trim().to_lowercase();
    if value.is_empty() {
        return "en".to_string();
    }

    if let Some((_, code)) = LANGUAGE_NAMES.iter().find(|(name, _)| *name == value) {
        return code.to_string();
    }

    // Locale tags: "es-ES", "zh_CN", "pt-br"
    let primary = value.split(['-', '_']).next().unwrap_or(&value);
    if primary.len() == 2 && primary.chars().all(|c| c.is_ascii_alphabetic()) {
        return primary.to_string();
    }

    // "English (US)", "Chinese Simplified"
    if let Some((_, code)) = LANGUAGE_NAMES.iter().find(|(name, _)| {
        value
            .split(|c: char| !c.is_alphanumeric())
            .next()
            .is_some_and(|word| word == *name)
    }) {
        return code.to_string();
    }

    value
}
