//! Offline postcode geocoding.
//!
//! Land Registry rows carry a postcode but no coordinates. This module maps the
//! postcode's outward code to a district centroid by longest-prefix match and
//! adds a small jitter so that rows sharing a prefix do not collapse onto one
//! point. The jitter is seeded from the postcode, so the same postcode always
//! lands on the same coordinate.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::Coordinates;

/// Jitter (degrees) around a matched district centroid.
const MATCH_JITTER_DEG: f64 = 0.005;

/// Rough centre of Great Britain, used when no prefix matches.
const FALLBACK_CENTRE: Coordinates = Coordinates {
    latitude: 54.0,
    longitude: -2.0,
};
const FALLBACK_JITTER_DEG: f64 = 0.5;

const MAX_PREFIX: usize = 4;

#[rustfmt::skip]
const PREFIX_CENTROIDS: &[(&str, f64, f64)] = &[
    ("SW1A", 51.5014, -0.1419), ("SW1B", 51.4984, -0.1421), ("SW1E", 51.4966, -0.1393),
    ("SW1H", 51.4975, -0.1323), ("SW1P", 51.4941, -0.1291), ("SW1V", 51.4914, -0.1443),
    ("SW1W", 51.4917, -0.1507), ("SW1X", 51.4970, -0.1557), ("SW1Y", 51.5070, -0.1365),
    ("SW3", 51.4883, -0.1708), ("SW4", 51.4626, -0.1454), ("SW5", 51.4896, -0.1911),
    ("SW6", 51.4726, -0.1994), ("SW7", 51.4946, -0.1743), ("SW8", 51.4787, -0.1214),
    ("SW9", 51.4635, -0.1134), ("SW10", 51.4826, -0.1840), ("SW11", 51.4647, -0.1651),
    ("SW12", 51.4441, -0.1488), ("SW13", 51.4725, -0.2408), ("SW14", 51.4656, -0.2676),
    ("SW15", 51.4531, -0.2306), ("SW16", 51.4169, -0.1294), ("SW17", 51.4297, -0.1632),
    ("SW18", 51.4502, -0.1870), ("SW19", 51.4175, -0.2014), ("SW20", 51.4117, -0.2293),
    ("W1", 51.5148, -0.1499), ("W2", 51.5113, -0.1840), ("W3", 51.5041, -0.2604),
    ("W4", 51.4882, -0.2604), ("W5", 51.5108, -0.3013), ("W6", 51.4885, -0.2254),
    ("W7", 51.5112, -0.3282), ("W8", 51.5013, -0.1929), ("W9", 51.5239, -0.1898),
    ("W10", 51.5228, -0.2094), ("W11", 51.5134, -0.2028), ("W12", 51.5050, -0.2358),
    ("W13", 51.5141, -0.3196), ("W14", 51.4944, -0.2099), ("WC1", 51.5230, -0.1195),
    ("WC2", 51.5116, -0.1230), ("EC1", 51.5230, -0.1065), ("EC2", 51.5187, -0.0837),
    ("EC3", 51.5118, -0.0800), ("EC4", 51.5139, -0.1010), ("E1", 51.5148, -0.0553),
    ("E2", 51.5280, -0.0667), ("E3", 51.5272, -0.0280), ("E4", 51.6256, -0.0084),
    ("E5", 51.5553, -0.0489), ("E6", 51.5241, 0.0457), ("E7", 51.5540, 0.0293),
    ("E8", 51.5410, -0.0594), ("E9", 51.5440, -0.0420), ("E10", 51.5635, -0.0152),
    ("E11", 51.5699, 0.0068), ("E12", 51.5524, 0.0540), ("E13", 51.5230, 0.0287),
    ("E14", 51.5065, -0.0207), ("E15", 51.5392, 0.0030), ("E16", 51.5094, 0.0254),
    ("E17", 51.5849, -0.0254), ("E18", 51.5944, 0.0181), ("N1", 51.5373, -0.1080),
    ("N2", 51.5869, -0.1693), ("N3", 51.6131, -0.1841), ("N4", 51.5679, -0.1037),
    ("N5", 51.5538, -0.0930), ("N6", 51.5713, -0.1461), ("N7", 51.5501, -0.1176),
    ("N8", 51.5800, -0.1128), ("N9", 51.6271, -0.0623), ("N10", 51.5963, -0.1413),
    ("N11", 51.6104, -0.1294), ("N12", 51.6131, -0.1748), ("N13", 51.6230, -0.1100),
    ("N14", 51.6385, -0.1232), ("N15", 51.5808, -0.0808), ("N16", 51.5606, -0.0751),
    ("N17", 51.5989, -0.0682), ("N18", 51.6178, -0.0722), ("N19", 51.5644, -0.1289),
    ("N20", 51.6220, -0.1711), ("N21", 51.6370, -0.0910), ("N22", 51.5982, -0.1088),
    ("NW1", 51.5302, -0.1437), ("NW2", 51.5571, -0.2116), ("NW3", 51.5475, -0.1729),
    ("NW4", 51.5826, -0.2265), ("NW5", 51.5509, -0.1415), ("NW6", 51.5418, -0.1935),
    ("NW7", 51.6172, -0.2301), ("NW8", 51.5311, -0.1710), ("NW9", 51.5827, -0.2604),
    ("NW10", 51.5383, -0.2336), ("NW11", 51.5773, -0.1896), ("SE1", 51.5042, -0.1037),
    ("SE2", 51.4799, 0.1050), ("SE3", 51.4605, 0.0100), ("SE4", 51.4572, -0.0416),
    ("SE5", 51.4753, -0.0900), ("SE6", 51.4477, -0.0198), ("SE7", 51.4783, 0.0397),
    ("SE8", 51.4747, -0.0299), ("SE9", 51.4463, 0.0660), ("SE10", 51.4832, 0.0035),
    ("SE11", 51.4929, -0.1061), ("SE12", 51.4476, 0.0358), ("SE13", 51.4549, -0.0125),
    ("SE14", 51.4747, -0.0419), ("SE15", 51.4696, -0.0639), ("SE16", 51.5000, -0.0500),
    ("SE17", 51.4886, -0.0944), ("SE18", 51.4656, 0.0725), ("SE19", 51.4157, -0.0814),
    ("SE20", 51.4109, -0.0545), ("SE21", 51.4350, -0.0850), ("SE22", 51.4529, -0.0719),
    ("SE23", 51.4366, -0.0552), ("SE24", 51.4517, -0.1023), ("SE25", 51.3973, -0.0738),
    ("SE26", 51.4263, -0.0491), ("SE27", 51.4320, -0.1028), ("SE28", 51.4928, 0.1040),
    ("M1", 53.4808, -2.2426), ("M2", 53.4794, -2.2453), ("M3", 53.4830, -2.2573),
    ("M4", 53.4820, -2.2354), ("M5", 53.4872, -2.2856), ("M", 53.4808, -2.2426),
    ("B1", 52.4796, -1.9026), ("B2", 52.4755, -1.8986), ("B3", 52.4862, -1.8982),
    ("B4", 52.4830, -1.8899), ("B5", 52.4737, -1.8920), ("B", 52.4862, -1.8904),
    ("L1", 53.4084, -2.9916), ("L2", 53.4041, -2.9855), ("L3", 53.4100, -2.9810),
    ("L", 53.4084, -2.9916), ("LS", 53.7997, -1.5492), ("S", 53.3811, -1.4701),
    ("CF", 51.4837, -3.1681), ("EH", 55.9533, -3.1883), ("G", 55.8642, -4.2518),
    ("BS", 51.4545, -2.5879), ("BA", 51.3813, -2.3594), ("OX", 51.7520, -1.2577),
    ("RG", 51.4543, -0.9781), ("SL", 51.5085, -0.5950), ("HP", 51.7575, -0.7419),
    ("AL", 51.7538, -0.3395), ("SG", 51.9004, -0.1971), ("LU", 51.8787, -0.4200),
    ("MK", 52.0406, -0.7594), ("NG", 52.9548, -1.1581), ("DE", 52.9225, -1.4746),
    ("LE", 52.6369, -1.1398), ("CV", 52.4082, -1.5108), ("WV", 52.5862, -2.1272),
    ("DY", 52.5113, -2.0874), ("WS", 52.5858, -1.9824), ("ST", 53.0027, -2.1794),
    ("LN", 53.2307, -0.5406), ("PE", 52.5736, -0.2408), ("NN", 52.2405, -0.9027),
    ("BD", 53.7959, -1.7594), ("HD", 53.6459, -1.7850), ("HX", 53.7215, -1.8633),
    ("WF", 53.6826, -1.4997), ("HU", 53.7457, -0.3367), ("DN", 53.5228, -1.1282),
    ("YO", 53.9600, -1.0873), ("HG", 53.9939, -1.5377), ("NE", 54.9783, -1.6178),
    ("DH", 54.7753, -1.5849), ("SR", 54.9058, -1.3816), ("TS", 54.5742, -1.2349),
    ("DL", 54.5271, -1.5526), ("CA", 54.8951, -2.9382), ("LA", 54.0500, -2.8000),
    ("BN", 50.8225, -0.1372), ("PO", 50.7989, -1.0913), ("SO", 50.9097, -1.4044),
    ("GU", 51.2362, -0.5704), ("KT", 51.4100, -0.3020), ("CR", 51.3762, -0.0982),
    ("SM", 51.3618, -0.1945), ("TW", 51.4494, -0.3260), ("RH", 51.1732, -0.1879),
    ("TN", 51.1328, 0.2637), ("ME", 51.2717, 0.5268), ("CT", 51.2802, 1.0789),
    ("DA", 51.4441, 0.2182), ("CB", 52.2053, 0.1218), ("NR", 52.6309, 1.2974),
    ("IP", 52.0567, 1.1482), ("CO", 51.8959, 0.8919), ("CM", 51.7356, 0.4685),
    ("SS", 51.5462, 0.7077), ("RM", 51.5726, 0.1748), ("IG", 51.5582, 0.0731),
    ("CH", 53.1914, -2.8920), ("WA", 53.3900, -2.5970), ("CW", 53.0996, -2.4414),
    ("SK", 53.4083, -2.1494), ("OL", 53.5409, -2.1114), ("BL", 53.5813, -2.4340),
    ("WN", 53.5555, -2.6323), ("PR", 53.7590, -2.6988), ("FY", 53.8175, -3.0353),
    ("BB", 53.7581, -2.4824), ("EX", 50.7236, -3.5275), ("PL", 50.3755, -4.1427),
    ("TQ", 50.4619, -3.5251), ("TR", 50.2632, -5.0510), ("BH", 50.7192, -1.8808),
    ("DT", 50.7134, -2.4380), ("SP", 51.0682, -1.7954), ("SN", 51.5604, -1.7800),
    ("GL", 51.8649, -2.2448), ("TA", 51.0159, -3.1006), ("WR", 52.1936, -2.2217),
    ("SA", 51.6214, -3.9441), ("NP", 51.5841, -2.9977), ("LL", 53.2271, -4.1281),
    ("SY", 52.7078, -3.0764), ("LD", 52.2422, -3.3793), ("AB", 57.1497, -2.0943),
    ("DD", 56.4620, -2.9707), ("FK", 56.1165, -3.9369), ("KY", 56.1128, -3.1636),
    ("PH", 56.3950, -3.4313), ("IV", 57.4778, -4.2247), ("PA", 55.8455, -4.4234),
    ("KA", 55.4628, -4.6288), ("ML", 55.7905, -3.9910), ("DG", 55.0752, -3.6040),
    ("TD", 55.7704, -2.0050), ("EN", 51.6527, -0.0762), ("HA", 51.5790, -0.3337),
    ("UB", 51.5470, -0.4447), ("BR", 51.4056, 0.0177), ("WD", 51.6575, -0.3959),
];

fn centroids() -> &'static HashMap<&'static str, Coordinates> {
    static TABLE: OnceLock<HashMap<&'static str, Coordinates>> = OnceLock::new();
    TABLE.get_or_init(|| {
        PREFIX_CENTROIDS
            .iter()
            .map(|&(prefix, lat, lon)| (prefix, Coordinates::new(lat, lon)))
            .collect()
    })
}

/// How a coordinate was obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeoMatch {
    /// Matched a district prefix of this length.
    Prefix(usize),
    /// Nothing matched; national fallback.
    Fallback,
}

/// Centroid lookup without jitter.
///
/// The outward code (the part before the space) is matched when present, so
/// `SE1 4XX` resolves to `SE1` rather than `SE14`. Postcodes written without a
/// space are matched on their compact form.
pub fn district_centroid(postcode: &str) -> Option<(Coordinates, usize)> {
    let key = match_key(postcode);
    let table = centroids();
    (1..=key.len().min(MAX_PREFIX))
        .rev()
        .filter(|&len| key.is_char_boundary(len))
        .find_map(|len| table.get(&key[..len]).map(|c| (*c, len)))
}

/// Approximate coordinates for `postcode`, deterministic per postcode.
pub fn approximate_location(postcode: &str) -> (Coordinates, GeoMatch) {
    let mut rng = StdRng::seed_from_u64(postcode_seed(postcode));
    match district_centroid(postcode) {
        Some((centre, len)) => (jitter(centre, MATCH_JITTER_DEG, &mut rng), GeoMatch::Prefix(len)),
        None => (
            jitter(FALLBACK_CENTRE, FALLBACK_JITTER_DEG, &mut rng),
            GeoMatch::Fallback,
        ),
    }
}

fn match_key(postcode: &str) -> String {
    let trimmed = postcode.trim().to_ascii_uppercase();
    match trimmed.split_once(char::is_whitespace) {
        Some((outward, _)) => outward.to_string(),
        None => trimmed,
    }
}

fn jitter(centre: Coordinates, sd: f64, rng: &mut StdRng) -> Coordinates {
    match Normal::new(0.0, sd) {
        Ok(normal) => Coordinates::new(
            centre.latitude + normal.sample(rng),
            centre.longitude + normal.sample(rng),
        ),
        Err(_) => centre,
    }
}

fn postcode_seed(postcode: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    postcode
        .split_whitespace()
        .collect::<String>()
        .to_ascii_uppercase()
        .hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_longest_matching_prefix() {
        let (c, len) = district_centroid("SW1A 1AA").unwrap();
        assert_eq!(len, 4);
        assert_eq!(c, Coordinates::new(51.5014, -0.1419));

        let (c, len) = district_centroid("PO1 3AX").unwrap();
        assert_eq!(len, 2);
        assert_eq!(c, Coordinates::new(50.7989, -1.0913));
    }

    #[test]
    fn outward_code_is_not_confused_with_longer_district() {
        let (_, len) = district_centroid("SE1 4XX").unwrap();
        assert_eq!(len, 3);
        let (c, _) = district_centroid("se14 5ab").unwrap();
        assert_eq!(c, Coordinates::new(51.4747, -0.0419));
    }

    #[test]
    fn jitter_is_small_and_deterministic() {
        let (a, how) = approximate_location("PO1 3AX");
        let (b, _) = approximate_location("po1  3ax");
        assert_eq!(how, GeoMatch::Prefix(2));
        assert_eq!(a, b);
        assert!((a.latitude - 50.7989).abs() < 0.05);
        assert!((a.longitude + 1.0913).abs() < 0.05);

        let (c, _) = approximate_location("PO1 3AY");
        assert_ne!(a, c);
    }

    #[test]
    fn unknown_prefix_falls_back_to_national_centre() {
        let (c, how) = approximate_location("ZZ9 9ZZ");
        assert_eq!(how, GeoMatch::Fallback);
        assert!((c.latitude - 54.0).abs() < 5.0);
        assert!(c.is_finite());
    }
}
