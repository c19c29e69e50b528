// Chorale harmonizer CLI entry point.
//
// Builds a constraint list from space-separated voice and numeral lines,
// runs the part writer, and prints the best chorales found.
//
// Usage:
//   cargo run -p chorale_harmony -- [--key C] [--minor] [--numerals "I V I"]
//     [--soprano "E4 D4 E4"] [--alto ...] [--tenor ...] [--bass "C3 _ C3"]
//     [--ordering greedy|default|depth]
//     [--modulate] [--no-progressions] [--no-cache] [--config rules.json]
//     [--harmonizer-config harmonizer.json] [--midi out.mid] [--tempo BPM] [--count N]
//
// `_` leaves a position free. Numeral tokens take flags after a colon:
// `V/ii:pivot`, `I:pac,sequence`. Diagnostics go to stderr (RUST_LOG,
// default warn).

use chorale_harmony::midi::write_midi;
use chorale_harmony::params::{HarmonizerParameters, PartWriterParameters, PartWritingParameters, YieldOrdering};
use chorale_harmony::{HarmonyError, IncompleteChord, PartWriter, Voice, VoiceSlot};
use chorale_theory::{RomanNumeral, Scale};
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    match run(&args) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("No harmonization found.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Command-line options. Value flags take the next argument.
#[derive(Debug, Default)]
struct CliOptions {
    key: Option<String>,
    minor: bool,
    numerals: Vec<String>,
    voices: [Vec<String>; 4],
    ordering: Option<YieldOrdering>,
    modulate: bool,
    no_progressions: bool,
    no_cache: bool,
    config: Option<String>,
    harmonizer_config: Option<String>,
    midi: Option<String>,
    tempo: Option<u16>,
    count: Option<usize>,
}

impl CliOptions {
    /// Parse `args` (program name first). Unknown flags, missing values and
    /// unparsable numbers are input errors.
    fn parse(args: &[String]) -> Result<CliOptions, HarmonyError> {
        let mut options = CliOptions::default();
        let mut rest = args.iter().skip(1);
        while let Some(flag) = rest.next() {
            let mut value = || {
                rest.next()
                    .cloned()
                    .ok_or_else(|| HarmonyError::Input(format!("{flag} needs a value")))
            };
            let tokens = |line: String| line.split_whitespace().map(str::to_string).collect::<Vec<_>>();
            match flag.as_str() {
                "--key" => options.key = Some(value()?),
                "--minor" => options.minor = true,
                "--numerals" => options.numerals = tokens(value()?),
                "--soprano" => options.voices[Voice::Soprano.index()] = tokens(value()?),
                "--alto" => options.voices[Voice::Alto.index()] = tokens(value()?),
                "--tenor" => options.voices[Voice::Tenor.index()] = tokens(value()?),
                "--bass" => options.voices[Voice::Bass.index()] = tokens(value()?),
                "--ordering" => options.ordering = Some(value()?.parse()?),
                "--modulate" => options.modulate = true,
                "--no-progressions" => options.no_progressions = true,
                "--no-cache" => options.no_cache = true,
                "--config" => options.config = Some(value()?),
                "--harmonizer-config" => options.harmonizer_config = Some(value()?),
                "--midi" => options.midi = Some(value()?),
                "--tempo" => options.tempo = Some(number(flag, &value()?)?),
                "--count" => options.count = Some(number(flag, &value()?)?),
                other => return Err(HarmonyError::Input(format!("unknown flag {other}"))),
            }
        }
        Ok(options)
    }

    fn scale(&self) -> Result<Scale, HarmonyError> {
        let mode = if self.minor { "minor" } else { "major" };
        Ok(format!("{} {mode}", self.key.as_deref().unwrap_or("C")).parse()?)
    }

    /// Harmonizer settings: the config file if given, then the switches.
    fn harmonizer(&self) -> Result<HarmonizerParameters, HarmonyError> {
        let mut params = match &self.harmonizer_config {
            Some(path) => HarmonizerParameters::load(Path::new(path))?,
            None => HarmonizerParameters::default(),
        };
        params.can_modulate |= self.modulate;
        params.use_progressions &= !self.no_progressions;
        params.disable_caching |= self.no_cache;
        Ok(params)
    }

    fn writing(&self) -> Result<PartWritingParameters, HarmonyError> {
        match &self.config {
            Some(path) => PartWritingParameters::load(Path::new(path)),
            None => Ok(PartWritingParameters::default()),
        }
    }

    /// One constraint per position, as long as the longest line given.
    fn constraints(&self, scale: Scale) -> Result<Vec<IncompleteChord>, HarmonyError> {
        let len = self
            .voices
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.numerals.len()))
            .max()
            .unwrap_or(0);
        let mut constraints = vec![IncompleteChord::new(); len];
        for (position, token) in self.numerals.iter().enumerate() {
            constraints[position] = parse_numeral_token(token, scale, constraints[position].clone())?;
        }
        for voice in Voice::ALL {
            for (position, token) in self.voices[voice.index()].iter().enumerate() {
                let slot = VoiceSlot::parse(token)?;
                constraints[position] = constraints[position].clone().with_voice(voice, slot);
            }
        }
        Ok(constraints)
    }
}

fn number<T: std::str::FromStr>(flag: &str, text: &str) -> Result<T, HarmonyError> {
    text.parse()
        .map_err(|_| HarmonyError::Input(format!("{flag} expects a number, got {text:?}")))
}

/// Returns whether any chorale was found.
fn run(args: &[String]) -> Result<bool, HarmonyError> {
    let options = CliOptions::parse(args)?;
    let scale = options.scale()?;
    let ordering = options.ordering.unwrap_or_default();
    let constraints = options.constraints(scale)?;
    if constraints.is_empty() {
        return Err(HarmonyError::Input(
            "give at least one of --numerals, --soprano, --alto, --tenor or --bass".to_string(),
        ));
    }

    println!("=== Chorale Harmonizer ===");
    println!("Key: {scale}");
    println!("Positions: {}", constraints.len());
    println!("Ordering: {ordering:?}");
    println!();

    let writer = PartWriter::new(
        options.harmonizer()?,
        PartWriterParameters { yield_ordering: ordering },
        &options.writing()?,
    )?;
    let solutions = writer.voice_all(&constraints, scale)?;

    let mut found = 0;
    let mut first = None;
    for (i, chorale) in solutions.iter().take(options.count.unwrap_or(1)).enumerate() {
        println!("[{}]", i + 1);
        for chord in &chorale {
            println!("  {chord}");
        }
        println!();
        found += 1;
        first.get_or_insert(chorale);
    }
    let stats = writer.harmonizer().stats();
    debug!(hits = stats.hits(), misses = stats.misses(), "harmonizer cache");

    if let (Some(path), Some(chorale)) = (&options.midi, &first) {
        write_midi(chorale, Path::new(path), options.tempo.unwrap_or(72))?;
        println!("Wrote {path}");
    }
    Ok(found > 0)
}

/// `V7`, `V/ii:pivot`, `_:pac` (flags without a numeral).
fn parse_numeral_token(token: &str, scale: Scale, chord: IncompleteChord) -> Result<IncompleteChord, HarmonyError> {
    let (text, flags) = token.split_once(':').unwrap_or((token, ""));
    let mut chord = match text {
        "_" | "-" | "" => chord,
        text => chord.with_numeral(RomanNumeral::parse(text, scale)?),
    };
    for flag in flags.split(',').filter(|f| !f.is_empty()) {
        chord = chord.with_flag(flag, true);
    }
    Ok(chord)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        std::iter::once("harmonize")
            .chain(line.split(' '))
            .map(str::to_string)
            .collect()
    }

    fn with_value(flag: &str, value: &str) -> Vec<String> {
        ["harmonize", flag, value].map(str::to_string).to_vec()
    }

    #[test]
    fn test_flags_fill_options() {
        let mut argv = args("--key G --minor --modulate --count 3 --ordering depth");
        argv.extend(with_value("--soprano", "G4 _ D5").into_iter().skip(1));
        let options = CliOptions::parse(&argv).unwrap();
        assert_eq!(options.scale().unwrap().to_string(), "G minor");
        assert!(options.harmonizer().unwrap().can_modulate);
        assert_eq!(options.count, Some(3));
        assert_eq!(options.ordering, Some(YieldOrdering::DepthBest));
        assert_eq!(options.voices[Voice::Soprano.index()], ["G4", "_", "D5"]);
    }

    #[test]
    fn test_bad_arguments_are_rejected() {
        assert!(matches!(CliOptions::parse(&args("--loud")), Err(HarmonyError::Input(_))));
        assert!(matches!(CliOptions::parse(&args("--count")), Err(HarmonyError::Input(_))));
        assert!(matches!(CliOptions::parse(&args("--tempo fast")), Err(HarmonyError::Input(_))));
    }

    #[test]
    fn test_numeral_tokens_carry_flags() {
        let options = CliOptions::parse(&with_value("--numerals", "I V:hc _:pac")).unwrap();
        let constraints = options.constraints(options.scale().unwrap()).unwrap();
        assert_eq!(constraints.len(), 3);
        assert!(constraints[1].all_flags().unwrap().is_set("hc"));
        assert!(constraints[2].numeral.is_none());
        assert!(constraints[2].all_flags().unwrap().is_set("pac"));
    }
}
