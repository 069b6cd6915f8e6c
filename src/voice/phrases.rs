//! Character skins and phrase tables
//!
//! Three fixed characters, each with an RGB565 palette for the renderer and
//! four phrase variants per request kind. A variant is picked at random per
//! utterance so repeated taps don't sound canned.

use rand::Rng;

use super::RequestKind;

/// Number of phrase variants per character and kind
pub const PHRASE_VARIANTS: usize = 4;

/// Visual style and identity of one character skin
#[derive(Debug, Clone, Copy)]
pub struct CharacterStyle {
    /// Display name (also sent as the `X-Character` STT header)
    pub name: &'static str,
    /// Head/belly fill color (RGB565)
    pub head: u16,
    /// Body fill color (RGB565)
    pub body: u16,
    /// Accent color for feet/ears (RGB565)
    pub accent: u16,
    /// Eye color (RGB565)
    pub eye: u16,
}

/// The three built-in character skins
pub const CHARACTERS: [CharacterStyle; 3] = [
    CharacterStyle {
        name: "アンパンボーヤ",
        head: 0xFEE0,
        body: 0xFE60,
        accent: 0xF800,
        eye: 0x0000,
    },
    CharacterStyle {
        name: "はやぶさ",
        head: 0x07FF,
        body: 0x07E0,
        accent: 0x07FF,
        eye: 0x0000,
    },
    CharacterStyle {
        name: "もこ",
        head: 0xFCF0,
        body: 0xFDF0,
        accent: 0xF8B2,
        eye: 0x0000,
    },
];

const PHRASES_HAPPY: [[&str; PHRASE_VARIANTS]; 3] = [
    [
        "げんきをだして！",
        "きみはひとりじゃない！",
        "えがおがいちばん！",
        "ぼくがまもるよ！",
    ],
    [
        "やったー！",
        "はしるのだいすき！",
        "しゅっぱつしんこう！",
        "かぜになるぞ！",
    ],
    [
        "うれしいな！",
        "ふわふわ〜",
        "おはなばたけいきたい",
        "だいすきだよ〜",
    ],
];

const PHRASES_SAD: [[&str; PHRASE_VARIANTS]; 3] = [
    [
        "かなしいなあ",
        "おなかがすいたよ",
        "たすけてほしいな",
        "ちからがでない",
    ],
    ["うぅ", "おくれちゃうよ", "とまりたくない", "しんごうがあかだ"],
    ["えーん", "さびしいよう", "おみみがつめたい", "ぴえん"],
];

const PHRASES_CLEAN: [[&str; PHRASE_VARIANTS]; 3] = [
    [
        "きれいにしたよ！",
        "ぴかぴかだね！",
        "おそうじだいすき！",
        "せいけつがいちばん！",
    ],
    [
        "ぴかぴか！",
        "そうじかんりょう！",
        "しゃたいせいび！",
        "つるつるだね！",
    ],
    [
        "おそうじできた！",
        "きれいきれい〜",
        "ふわぁすっきり",
        "もこもこになった！",
    ],
];

const PHRASES_BOOT: [[&str; PHRASE_VARIANTS]; 3] = [
    [
        "ぼくアンパンボーヤ！みんなのことまもるからね、いっしょにあそぼう！",
        "やあ、げんきかな？ぼくアンパンボーヤだよ、こまったことがあったらいつでもよんでね！",
        "こんにちは！きょうもいいてんきだね、なにしてあそぶ？",
        "あたらしいかおになったよ！ちからもりもりだ！",
    ],
    [
        "はやぶさ、しゅっぱつしんこう！きょうもいっしょにはしろうね！",
        "みんなおまたせ！E5けいはやぶさだよ、のってくれるかな？",
        "いくよー！つぎのえきまでぜんそくぜんしんだ！",
        "はやぶさけんざん！きょうもかぜみたいにはしるぞー！",
    ],
    [
        "もこだよ、よろしくね！きょうもふわふわいいきもち！",
        "おはよう！もこはきょうもげんきだよ、いっしょにあそぼ！",
        "もこもこ〜、おみみであたたかいね、きょうもなかよくしよう！",
        "あそぼう！もこといっしょにおさんぽしよ！",
    ],
];

/// Short phrase voiced by the secondary beep tone
pub const PHRASE_BEEP: &str = "ピーッ";

/// Clamp a character index into range
pub fn character_index(idx: u8) -> usize {
    (idx as usize).min(CHARACTERS.len() - 1)
}

/// Pick a specific phrase variant for a character and request kind.
///
/// `SttReply` has no table; callers speak the transcribed text instead.
pub fn phrase_variant(kind: RequestKind, character: u8, variant: usize) -> Option<&'static str> {
    let ci = character_index(character);
    let vi = variant % PHRASE_VARIANTS;
    let table = match kind {
        RequestKind::Happy => &PHRASES_HAPPY,
        RequestKind::Sad => &PHRASES_SAD,
        RequestKind::Clean => &PHRASES_CLEAN,
        RequestKind::Boot => &PHRASES_BOOT,
        RequestKind::SttReply => return None,
    };
    Some(table[ci][vi])
}

/// Pick a random phrase variant for a character and request kind
pub fn phrase_for(kind: RequestKind, character: u8) -> Option<&'static str> {
    let variant = rand::rng().random_range(0..PHRASE_VARIANTS);
    phrase_variant(kind, character, variant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_variants_for_every_character() {
        for kind in [
            RequestKind::Happy,
            RequestKind::Sad,
            RequestKind::Clean,
            RequestKind::Boot,
        ] {
            for ci in 0..CHARACTERS.len() as u8 {
                for vi in 0..PHRASE_VARIANTS {
                    let phrase = phrase_variant(kind, ci, vi).unwrap();
                    assert!(!phrase.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_stt_reply_has_no_table() {
        assert!(phrase_variant(RequestKind::SttReply, 0, 0).is_none());
    }

    #[test]
    fn test_out_of_range_character_clamped() {
        assert_eq!(character_index(200), CHARACTERS.len() - 1);
        assert!(phrase_variant(RequestKind::Happy, 200, 0).is_some());
    }
}
