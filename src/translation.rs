//! Korean → Russian display translation.
//!
//! Marketplace facet responses come back in Korean. The bot shows them in
//! Russian where a dictionary entry exists and falls back to the original
//! token otherwise. Replacement is longest-key-first so that compound
//! phrases win over their fragments.

use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    /// Static phrase dictionary. Keys are native-language tokens exactly as
    /// the upstream APIs emit them.
    pub static ref TRANSLATIONS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        // Fuel and drivetrain
        m.insert("가솔린", "Бензин");
        m.insert("디젤", "Дизель");
        m.insert("하이브리드", "Гибрид");
        m.insert("전기", "Электро");
        m.insert("오토", "Автомат");
        m.insert("수동", "Механика");
        m.insert("터보", "Турбо");
        m.insert("4WD", "4WD");
        // Common trim words
        m.insert("프리미엄", "Премиум");
        m.insert("익스클루시브", "Эксклюзив");
        m.insert("스페셜", "Спешл");
        m.insert("모던", "Модерн");
        m.insert("스마트", "Смарт");
        m.insert("시그니처", "Сигнатюр");
        m.insert("캘리그래피", "Каллиграфи");
        m.insert("르블랑", "Ле Блан");
        // Manufacturers and model groups seen in facet data
        m.insert("현대", "Хёндэ");
        m.insert("기아", "Киа");
        m.insert("제네시스", "Дженезис");
        m.insert("쉐보레", "Шевроле");
        m.insert("르노코리아", "Рено Корея");
        m.insert("쌍용", "Ссанъён");
        m.insert("그랜저", "Грандёр");
        m.insert("쏘나타", "Соната");
        m.insert("아반떼", "Аванте");
        m.insert("쏘렌토", "Соренто");
        m.insert("카니발", "Карнивал");
        m.insert("팰리세이드", "Палисейд");
        // Generation qualifiers
        m.insert("신형", "новый кузов");
        m.insert("더 뉴", "Зе Нью");
        m.insert("올 뉴", "Олл Нью");
        m.insert("현재", "н.в.");
        // Regions
        m.insert("서울", "Сеул");
        m.insert("부산", "Пусан");
        m.insert("인천", "Инчхон");
        m.insert("대구", "Тэгу");
        m.insert("대전", "Тэджон");
        m.insert("광주", "Кванджу");
        m.insert("울산", "Ульсан");
        m.insert("세종", "Седжон");
        m.insert("경기", "Кёнги-до");
        m.insert("강원", "Канвон-до");
        m.insert("충북", "Чхунчхон-Пукто");
        m.insert("충남", "Чхунчхон-Намдо");
        m.insert("전북", "Чолла-Пукто");
        m.insert("전남", "Чолла-Намдо");
        m.insert("경북", "Кёнсан-Пукто");
        m.insert("경남", "Кёнсан-Намдо");
        m.insert("제주", "Чеджу-до");
        // Colors (shared vocabulary across the three sites)
        m.insert("검정색", "Чёрный");
        m.insert("흰색", "Белый");
        m.insert("은색", "Серебристый");
        m.insert("진주색", "Жемчужный");
        m.insert("회색", "Серый");
        m.insert("쥐색", "Тёмно-серый");
        m.insert("빨간색", "Красный");
        m.insert("파란색", "Синий");
        m.insert("청색", "Синий");
        m.insert("하늘색", "Голубой");
        m.insert("주황색", "Оранжевый");
        m.insert("갈색", "Коричневый");
        m.insert("초록색", "Зелёный");
        m.insert("녹색", "Зелёный");
        m.insert("노란색", "Жёлтый");
        m.insert("보라색", "Фиолетовый");
        m.insert("금색", "Золотистый");
        m
    };

    /// Dictionary keys sorted by length, longest first, so substring
    /// replacement never clobbers a longer phrase with a shorter one.
    static ref KEYS_LONGEST_FIRST: Vec<&'static str> = {
        let mut keys: Vec<&'static str> = TRANSLATIONS.keys().copied().collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        keys
    };
}

/// Translate a phrase, preferring an exact dictionary hit and otherwise
/// substituting every known token, longest match first. Unknown text is
/// returned unchanged.
pub fn translate(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if let Some(exact) = TRANSLATIONS.get(text) {
        return (*exact).to_string();
    }
    let mut result = text.to_string();
    for key in KEYS_LONGEST_FIRST.iter() {
        if result.contains(key) {
            result = result.replace(key, TRANSLATIONS[key]);
        }
    }
    result
}

/// Encar color facet values with their Russian display names.
pub const ENCAR_COLORS: &[(&str, &str)] = &[
    ("검정색", "Чёрный"),
    ("쥐색", "Тёмно-серый"),
    ("은색", "Серебристый"),
    ("은회색", "Серо-серебристый"),
    ("흰색", "Белый"),
    ("은하색", "Галактический серый"),
    ("명은색", "Светло-серебристый"),
    ("갈대색", "Коричневато-серый"),
    ("연금색", "Светло-золотистый"),
    ("청색", "Синий"),
    ("하늘색", "Голубой"),
    ("담녹색", "Тёмно-зелёный"),
    ("청옥색", "Бирюзовый"),
];

/// KbChaChaCha colors: native name, Russian name, site color code.
pub const KBCHACHACHA_COLORS: &[(&str, &str, &str)] = &[
    ("검정색", "Чёрный", "006001"),
    ("흰색", "Белый", "006002"),
    ("은색", "Серебристый", "006003"),
    ("진주색", "Жемчужный", "006004"),
    ("회색", "Серый", "006005"),
    ("빨간색", "Красный", "006006"),
    ("파란색", "Синий", "006007"),
    ("주황색", "Оранжевый", "006008"),
    ("갈색", "Коричневый", "006009"),
    ("초록색", "Зелёный", "006010"),
    ("노란색", "Жёлтый", "006011"),
    ("보라색", "Фиолетовый", "006012"),
];

/// KCar exterior color names with Russian display names. KCar filters by the
/// native name itself, so no code column.
pub const KCAR_COLORS: &[(&str, &str)] = &[
    ("흰색", "Белый"),
    ("진주색", "Жемчужный"),
    ("검정색", "Чёрный"),
    ("쥐색", "Тёмно-серый"),
    ("은색", "Серебристый"),
    ("은회색", "Серо-серебристый"),
    ("빨간색", "Красный"),
    ("주황색", "Оранжевый"),
    ("자주색", "Бордовый"),
    ("보라색", "Фиолетовый"),
    ("분홍색", "Розовый"),
    ("노란색", "Жёлтый"),
    ("갈색", "Коричневый"),
    ("금색", "Золотистый"),
    ("청색", "Синий"),
    ("하늘색", "Голубой"),
    ("담녹색", "Тёмно-зелёный"),
    ("녹색", "Зелёный"),
    ("연두색", "Салатовый"),
    ("청옥색", "Бирюзовый"),
    ("기타", "Другой"),
];

/// Russian display name for a KbChaChaCha color, with its site code.
pub fn kbchachacha_color(native: &str) -> Option<(&'static str, &'static str)> {
    KBCHACHACHA_COLORS
        .iter()
        .find(|(kr, _, _)| *kr == native)
        .map(|(_, ru, code)| (*ru, *code))
}

/// Russian display name for a KCar color.
pub fn kcar_color(native: &str) -> Option<&'static str> {
    KCAR_COLORS
        .iter()
        .find(|(kr, _)| *kr == native)
        .map(|(_, ru)| *ru)
}

/// Russian display name for an Encar color.
pub fn encar_color(native: &str) -> Option<&'static str> {
    ENCAR_COLORS
        .iter()
        .find(|(kr, _)| *kr == native)
        .map(|(_, ru)| *ru)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins() {
        assert_eq!(translate("가솔린"), "Бензин");
    }

    #[test]
    fn longest_match_first() {
        // "더 뉴" must be replaced as a phrase, not word by word.
        assert_eq!(translate("더 뉴 그랜저"), "Зе Нью Грандёр");
    }

    #[test]
    fn mixed_text_keeps_unknown_parts() {
        assert_eq!(translate("그랜저 IG"), "Грандёр IG");
        assert_eq!(translate("unknown"), "unknown");
    }

    #[test]
    fn empty_input() {
        assert_eq!(translate(""), "");
    }

    #[test]
    fn color_lookups() {
        assert_eq!(kbchachacha_color("검정색"), Some(("Чёрный", "006001")));
        assert_eq!(kcar_color("하늘색"), Some("Голубой"));
        assert_eq!(encar_color("청옥색"), Some("Бирюзовый"));
        assert_eq!(kbchachacha_color("없는색"), None);
    }
}
