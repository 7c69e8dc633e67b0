//! Hairstyle and hair color presets.
//!
//! The tables are fixed at compile time; everything downstream holds
//! `&'static` references into them.

use serde::Serialize;

/// A hairstyle the renderer can apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StylePreset {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub prompt: &'static str,
    pub description: &'static str,
}

/// A hair color the renderer can apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub hex: &'static str,
    pub prompt: &'static str,
}

pub static HAIRSTYLES: [StylePreset; 14] = [
    StylePreset {
        id: "classic",
        name: "Classic",
        icon: "fa-user-tie",
        prompt: "a neat, classic side-part professional haircut for a man, natural texture, clean hairline",
        description: "Clean, professional and timeless look.",
    },
    StylePreset {
        id: "korean-wavy",
        name: "Korean Wavy",
        icon: "fa-star",
        prompt: "trendy Korean-style wavy curtain bangs hairstyle, soft texture, medium length, voluminous",
        description: "Soft, wavy and stylish K-drama look.",
    },
    StylePreset {
        id: "wolf-cut",
        name: "Wolf Cut",
        icon: "fa-paw",
        prompt: "modern shaggy wolf cut with heavy layers and face-framing bangs, textured and edgy",
        description: "Wild, layered, and incredibly trendy.",
    },
    StylePreset {
        id: "modern-mullet",
        name: "Modern Mullet",
        icon: "fa-dragon",
        prompt: "contemporary tapered mullet, short textured sides, length and volume in the back, messy top",
        description: "The iconic Gen-Z revival style.",
    },
    StylePreset {
        id: "french-crop",
        name: "French Crop",
        icon: "fa-align-left",
        prompt: "sharp french crop haircut with a heavy textured fringe, skin fade on sides, clean contrast",
        description: "Low maintenance, high style.",
    },
    StylePreset {
        id: "butterfly-cut",
        name: "Butterfly",
        icon: "fa-hand-dots",
        prompt: "long butterfly haircut with voluminous layers, 90s blowout style, bouncy and glamorous",
        description: "Maximum volume and luxury layers.",
    },
    StylePreset {
        id: "fade",
        name: "Skin Fade",
        icon: "fa-scissors",
        prompt: "high skin fade with a textured quiff on top, precise surgical line, sharp grooming",
        description: "Modern, sharp edges with a clean blend.",
    },
    StylePreset {
        id: "buzzcut",
        name: "Buzz Cut",
        icon: "fa-user-circle",
        prompt: "precise military style buzz cut, uniform short length, clean geometric hairline",
        description: "Minimalist, bold and effortless.",
    },
    StylePreset {
        id: "messy-volume",
        name: "Messy Volume",
        icon: "fa-wind",
        prompt: "voluminous messy matte texture hairstyle, beachy salt-spray look, natural movement",
        description: "Relaxed, effortless \"just out of bed\" style.",
    },
    StylePreset {
        id: "sleek-bob",
        name: "Sleek Bob",
        icon: "fa-female",
        prompt: "ultra-sleek chin-length glass hair bob, perfectly straight, high shine, middle part",
        description: "High-fashion, sharp and sophisticated.",
    },
    StylePreset {
        id: "pixie-edgy",
        name: "Edgy Pixie",
        icon: "fa-bolt",
        prompt: "short edgy pixie cut with textured spikes and micro-fringe, platinum blonde highlights",
        description: "Bold, short and full of personality.",
    },
    StylePreset {
        id: "top-knot",
        name: "Top Knot",
        icon: "fa-circle-notch",
        prompt: "man bun top knot with undercut sides, long hair tied back, clean beard integration",
        description: "Rugged, modern and functional.",
    },
    StylePreset {
        id: "curtain-bangs",
        name: "Curtains",
        icon: "fa-columns",
        prompt: "classic 90s middle-part curtain hairstyle, soft flow, ear-length on sides",
        description: "The nostalgic heartthrob look.",
    },
    StylePreset {
        id: "afro-taper",
        name: "Afro Taper",
        icon: "fa-cloud",
        prompt: "well-defined natural afro with a clean taper fade, textured curls, rounded shape",
        description: "Celebrating natural texture with sharp lines.",
    },
];

/// The first entry is the default color.
pub static HAIR_COLORS: [ColorPreset; 9] = [
    ColorPreset { id: "natural", name: "Natural", hex: "#3D2314", prompt: "natural matching color" },
    ColorPreset { id: "platinum", name: "Platinum", hex: "#E5E4E2", prompt: "platinum blonde" },
    ColorPreset { id: "golden", name: "Golden", hex: "#D4AF37", prompt: "golden blonde" },
    ColorPreset { id: "rose", name: "Rose", hex: "#B76E79", prompt: "rose gold" },
    ColorPreset { id: "silver", name: "Silver", hex: "#C0C0C0", prompt: "silver grey" },
    ColorPreset { id: "midnight", name: "Midnight", hex: "#191970", prompt: "midnight blue" },
    ColorPreset { id: "neon", name: "Neon", hex: "#39FF14", prompt: "neon green" },
    ColorPreset { id: "purple", name: "Purple", hex: "#800080", prompt: "vibrant purple" },
    ColorPreset { id: "fire", name: "Fire", hex: "#FF4500", prompt: "fire orange red" },
];

pub fn default_color() -> &'static ColorPreset {
    &HAIR_COLORS[0]
}

pub fn find_style(id: &str) -> Option<&'static StylePreset> {
    HAIRSTYLES.iter().find(|s| s.id == id)
}

pub fn find_color(id: &str) -> Option<&'static ColorPreset> {
    HAIR_COLORS.iter().find(|c| c.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let styles: HashSet<_> = HAIRSTYLES.iter().map(|s| s.id).collect();
        assert_eq!(styles.len(), HAIRSTYLES.len());

        let colors: HashSet<_> = HAIR_COLORS.iter().map(|c| c.id).collect();
        assert_eq!(colors.len(), HAIR_COLORS.len());
    }

    #[test]
    fn default_color_is_natural() {
        assert_eq!(default_color().id, "natural");
        assert_eq!(HAIR_COLORS.iter().filter(|c| std::ptr::eq(*c, default_color())).count(), 1);
    }

    #[test]
    fn lookups() {
        assert_eq!(find_style("wolf-cut").map(|s| s.name), Some("Wolf Cut"));
        assert_eq!(find_color("platinum").map(|c| c.prompt), Some("platinum blonde"));
        assert!(find_style("mohawk").is_none());
        assert!(find_color("").is_none());
    }

    #[test]
    fn colors_are_hex() {
        for color in &HAIR_COLORS {
            assert!(color.hex.starts_with('#') && color.hex.len() == 7, "{}", color.id);
        }
    }
}
