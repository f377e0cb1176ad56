//! Rule-based English lemmatizer tuned for clinical vocabulary.
//!
//! Handles:
//! - Irregular forms (feet→foot, diagnoses→diagnosis, was→be)
//! - Regular plurals (disorders→disorder, allergies→allergy, reflexes→reflex)
//! - Past participles (infected→infect, related→relate, stopped→stop)
//! - Gerunds (taking→take, running→run), except nouns like "bleeding"
//!
//! `lemmatize` is applied until it reaches a fixed point, so a lemma always
//! lemmatizes to itself. Every suffix rule shortens the word and every
//! irregular lemma is a fixed point, so the loop terminates.

use std::collections::{HashMap, HashSet};

/// Tokens longer than this are left as they are.
const MAX_TOKEN_CHARS: usize = 64;

/// Lemmatizer with exception tables.
pub struct Lemmatizer {
    /// Irregular form → lemma. Every lemma is itself a fixed point.
    irregular: HashMap<&'static str, &'static str>,
    /// Words that look inflected but are already base forms
    invariant: HashSet<&'static str>,
}

impl Default for Lemmatizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lemmatizer {
    /// Create a lemmatizer with the default exception tables.
    pub fn new() -> Self {
        Self {
            irregular: Self::default_irregular(),
            invariant: Self::default_invariant(),
        }
    }

    /// Reduce a lowercase token to its base form.
    pub fn lemmatize(&self, token: &str) -> String {
        let mut current = token.to_string();
        loop {
            let next = self.rewrite(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// Add a custom irregular form.
    pub fn add_irregular(&mut self, form: &'static str, lemma: &'static str) {
        self.irregular.insert(form, lemma);
    }

    /// Mark a word as already being a base form.
    pub fn add_invariant(&mut self, word: &'static str) {
        self.invariant.insert(word);
    }

    /// Apply one rewrite rule.
    fn rewrite(&self, word: &str) -> String {
        if let Some(lemma) = self.irregular.get(word) {
            return (*lemma).to_string();
        }
        let len = word.chars().count();
        if self.invariant.contains(word)
            || len <= 3
            || len > MAX_TOKEN_CHARS
            || !word.chars().all(char::is_alphabetic)
        {
            return word.to_string();
        }

        if word.ends_with('s') {
            strip_plural(word)
        } else if word.ends_with("ed") {
            strip_past(word)
        } else if word.ends_with("ing") {
            strip_gerund(word)
        } else {
            word.to_string()
        }
    }

    fn default_irregular() -> HashMap<&'static str, &'static str> {
        let mut map = HashMap::new();

        // Nouns
        map.insert("feet", "foot");
        map.insert("teeth", "tooth");
        map.insert("children", "child");
        map.insert("men", "man");
        map.insert("women", "woman");
        map.insert("mice", "mouse");
        map.insert("lice", "louse");
        map.insert("geese", "goose");
        map.insert("people", "person");
        map.insert("knives", "knife");
        map.insert("halves", "half");
        map.insert("calves", "calf");
        map.insert("lives", "life");
        map.insert("wives", "wife");
        map.insert("shelves", "shelf");
        map.insert("leaves", "leaf");
        map.insert("selves", "self");

        // Greek and Latin plurals
        map.insert("vertebrae", "vertebra");
        map.insert("bacteria", "bacterium");
        map.insert("criteria", "criterion");
        map.insert("phenomena", "phenomenon");
        map.insert("data", "datum");
        map.insert("ova", "ovum");
        map.insert("fungi", "fungus");
        map.insert("nuclei", "nucleus");
        map.insert("bronchi", "bronchus");
        map.insert("alveoli", "alveolus");
        map.insert("stimuli", "stimulus");
        map.insert("bacilli", "bacillus");
        map.insert("calculi", "calculus");
        map.insert("emboli", "embolus");
        map.insert("thrombi", "thrombus");
        map.insert("foci", "focus");
        map.insert("diagnoses", "diagnosis");
        map.insert("prognoses", "prognosis");
        map.insert("psychoses", "psychosis");
        map.insert("neuroses", "neurosis");
        map.insert("thromboses", "thrombosis");
        map.insert("stenoses", "stenosis");
        map.insert("fibroses", "fibrosis");
        map.insert("metastases", "metastasis");
        map.insert("analyses", "analysis");
        map.insert("paralyses", "paralysis");
        map.insert("prostheses", "prosthesis");
        map.insert("anastomoses", "anastomosis");
        map.insert("crises", "crisis");
        map.insert("testes", "testis");
        map.insert("pelves", "pelvis");
        map.insert("appendices", "appendix");
        map.insert("indices", "index");
        map.insert("matrices", "matrix");
        map.insert("cervices", "cervix");
        map.insert("apices", "apex");
        map.insert("varices", "varix");
        map.insert("larynges", "larynx");
        map.insert("phalanges", "phalanx");
        map.insert("femora", "femur");
        map.insert("corpora", "corpus");

        // Plurals the suffix rules get wrong
        map.insert("causes", "cause");
        map.insert("abuses", "abuse");
        map.insert("uses", "use");

        // Verbs
        map.insert("is", "be");
        map.insert("are", "be");
        map.insert("was", "be");
        map.insert("were", "be");
        map.insert("been", "be");
        map.insert("being", "be");
        map.insert("am", "be");
        map.insert("has", "have");
        map.insert("had", "have");
        map.insert("having", "have");
        map.insert("does", "do");
        map.insert("did", "do");
        map.insert("done", "do");
        map.insert("doing", "do");
        map.insert("went", "go");
        map.insert("gone", "go");
        map.insert("made", "make");
        map.insert("took", "take");
        map.insert("taken", "take");
        map.insert("gave", "give");
        map.insert("given", "give");
        map.insert("broke", "break");
        map.insert("broken", "break");
        map.insert("bit", "bite");
        map.insert("bitten", "bite");
        map.insert("fell", "fall");
        map.insert("fallen", "fall");
        map.insert("found", "find");
        map.insert("saw", "see");
        map.insert("seen", "see");
        map.insert("knew", "know");
        map.insert("known", "know");
        map.insert("grew", "grow");
        map.insert("grown", "grow");
        map.insert("wore", "wear");
        map.insert("worn", "wear");
        map.insert("tore", "tear");
        map.insert("torn", "tear");
        map.insert("felt", "feel");
        map.insert("ate", "eat");
        map.insert("eaten", "eat");
        map.insert("written", "write");
        map.insert("driven", "drive");
        map.insert("frozen", "freeze");
        map.insert("stung", "sting");
        map.insert("died", "die");
        map.insert("lied", "lie");
        map.insert("tied", "tie");
        map.insert("dying", "die");
        map.insert("lying", "lie");
        map.insert("tying", "tie");
        map.insert("used", "use");
        map.insert("using", "use");

        map
    }

    fn default_invariant() -> HashSet<&'static str> {
        [
            // Singular nouns ending in -s
            "diabetes", "herpes", "rabies", "scabies", "measles", "mumps", "rickets",
            "shingles", "species", "series", "caries", "ascites", "feces", "faeces",
            "menses", "pancreas", "lens", "gas", "atlas", "bias", "alias", "biceps",
            "triceps", "quadriceps", "forceps", "aids", "news",
            // Nouns ending in -ing
            "bleeding", "swelling", "hearing", "feeling", "screening", "finding",
            "poisoning", "dressing", "training", "warning", "beginning", "ending",
            "building", "morning", "evening", "during", "ceiling", "sibling",
            "offspring", "nothing", "something", "anything", "everything", "pudding",
            "wedding", "lightning", "herring",
            // Non-participles ending in -ed
            "hundred", "sacred", "naked", "wicked", "kindred", "infrared",
        ]
        .into_iter()
        .collect()
    }
}

/// Plural suffix rules. The caller guarantees the word ends in `s`.
fn strip_plural(word: &str) -> String {
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    if word.ends_with("ies") && word.len() > 4 {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if word.ends_with("sses") {
        return word[..word.len() - 2].to_string();
    }
    if word.ends_with("aches") {
        return word[..word.len() - 1].to_string();
    }
    if word.ends_with("ches")
        || word.ends_with("shes")
        || word.ends_with("xes")
        || word.ends_with("zzes")
        || word.ends_with("uses")
    {
        return word[..word.len() - 2].to_string();
    }
    word[..word.len() - 1].to_string()
}

/// Past participle rules. The caller guarantees the word ends in `ed`.
fn strip_past(word: &str) -> String {
    if word.ends_with("eed") {
        return word.to_string();
    }
    if word.ends_with("ied") && word.len() > 4 {
        return format!("{}y", &word[..word.len() - 3]);
    }
    let stem = &word[..word.len() - 2];
    if !has_vowel(stem) {
        return word.to_string();
    }
    restore_stem(stem)
}

/// Gerund rules. The caller guarantees the word ends in `ing`.
fn strip_gerund(word: &str) -> String {
    let stem = &word[..word.len() - 3];
    if stem.chars().count() < 2 || !has_vowel(stem) {
        return word.to_string();
    }
    restore_stem(stem)
}

/// Rebuild a verb stem after its inflection was removed.
fn restore_stem(stem: &str) -> String {
    let chars: Vec<char> = stem.chars().collect();
    let mask = consonant_mask(&chars);
    let n = chars.len();
    let last = chars[n - 1];

    // relat→relate, disabl→disable, hospitaliz→hospitalize (treat stays)
    if (stem.ends_with("at") && n >= 3 && mask[n - 3]) || stem.ends_with("bl") || stem.ends_with("iz") {
        return format!("{}e", stem);
    }

    // stopp→stop, admitt→admit (but fall, pass, buzz stay)
    if n >= 2 && chars[n - 2] == last && mask[n - 1] {
        if !matches!(last, 'l' | 's' | 'z') {
            return chars[..n - 1].iter().collect();
        }
        // controll→control
        if last == 'l' && measure(&mask[..n - 1]) > 1 {
            return chars[..n - 1].iter().collect();
        }
        return stem.to_string();
    }

    // involv→involve, induc→induce, wheez→wheeze
    if matches!(last, 'v' | 'c' | 'z') {
        return format!("{}e", stem);
    }

    if last == 's' {
        // focus stays; caus→cause, diagnos→diagnose, collaps→collapse
        if stem.ends_with("us") && n >= 3 && mask[n - 3] {
            return stem.to_string();
        }
        return format!("{}e", stem);
    }

    // hop→hope, tak→take, cod→code
    if measure(&mask) == 1 && ends_cvc(&chars, &mask) {
        return format!("{}e", stem);
    }

    stem.to_string()
}

fn has_vowel(stem: &str) -> bool {
    let chars: Vec<char> = stem.chars().collect();
    consonant_mask(&chars).iter().any(|&consonant| !consonant)
}

/// Porter consonant test for every position: `y` is a consonant only at the
/// start or after a vowel.
fn consonant_mask(chars: &[char]) -> Vec<bool> {
    let mut mask: Vec<bool> = Vec::with_capacity(chars.len());
    for (i, c) in chars.iter().enumerate() {
        let consonant = match c {
            'a' | 'e' | 'i' | 'o' | 'u' => false,
            'y' => i == 0 || !mask[i - 1],
            _ => true,
        };
        mask.push(consonant);
    }
    mask
}

/// Porter measure: the number of vowel-consonant sequences.
fn measure(mask: &[bool]) -> usize {
    mask.windows(2).filter(|w| !w[0] && w[1]).count()
}

/// Consonant-vowel-consonant ending, where the final consonant is not w, x or y.
fn ends_cvc(chars: &[char], mask: &[bool]) -> bool {
    let n = chars.len();
    n >= 3 && mask[n - 3] && !mask[n - 2] && mask[n - 1] && !matches!(chars[n - 1], 'w' | 'x' | 'y')
}
