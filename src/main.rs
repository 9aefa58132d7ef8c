use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use rayon::prelude::*;
use xmlrec::record::{RecordSchema, RootTag};
use xmlrec::xml::XmlTextSink;
use xmlrec::{QName, Transcoder, TranscoderConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Transcode XML documents to record binary and back", long_about = None)]
struct Cli {
    /// XSD schema file(s); the first is the entry point
    #[arg(long = "xsd", value_name = "XSD_FILE")]
    xsd: Vec<Utf8PathBuf>,

    /// Record schema JSON file (generated from the XSD when omitted)
    #[arg(long = "schema", value_name = "SCHEMA_FILE")]
    schema: Option<Utf8PathBuf>,

    /// Root element, as `local` or `{namespace}local`
    #[arg(long = "root", value_name = "QNAME")]
    root: Option<String>,

    /// Decode binary inputs back to XML instead of encoding
    #[arg(short = 'd', long = "decode")]
    decode: bool,

    /// Print the record schema as JSON and exit
    #[arg(short = 'j', long = "json")]
    json: bool,

    /// Directory for outputs (defaults to writing next to each input)
    #[arg(short = 'o', long = "out-dir", value_name = "DIR")]
    out_dir: Option<Utf8PathBuf>,

    /// Input documents (XML, or binary with --decode)
    #[arg(value_name = "FILE")]
    inputs: Vec<Utf8PathBuf>,
}

/// Encoding needs the compiled machine; decoding is record-schema-driven.
enum Mode {
    Encode(Transcoder),
    Decode(RecordSchema),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mode = build_mode(&cli)?;

    if cli.json {
        let schema = match &mode {
            Mode::Encode(t) => t.schema(),
            Mode::Decode(s) => s,
        };
        println!("{}", serde_json::to_string_pretty(&schema.to_json())?);
        return Ok(());
    }
    if cli.inputs.is_empty() {
        bail!("no input files (pass --json to print the record schema)");
    }

    // The machine and record schema are immutable; transcodes share them
    // across worker threads, one pool per document.
    let results: Vec<Result<Utf8PathBuf>> = cli
        .inputs
        .par_iter()
        .map(|input| transcode_file(&mode, input, cli.out_dir.as_ref()))
        .collect();

    let mut failed = 0;
    for (input, result) in cli.inputs.iter().zip(results) {
        match result {
            Ok(output) => println!("{} -> {}", input, output),
            Err(err) => {
                eprintln!("{}: {:#}", input, err);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} inputs failed", failed, cli.inputs.len());
    }
    Ok(())
}

fn build_mode(cli: &Cli) -> Result<Mode> {
    let record_schema = match &cli.schema {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("Read {}", path))?;
            Some(RecordSchema::from_json_str(&text).with_context(|| format!("Parse {}", path))?)
        }
        None => None,
    };

    if cli.decode {
        let schema = match record_schema {
            Some(s) => s,
            None => build_transcoder(cli, None)?.schema().clone(),
        };
        return Ok(Mode::Decode(schema));
    }
    Ok(Mode::Encode(build_transcoder(cli, record_schema)?))
}

fn build_transcoder(cli: &Cli, record_schema: Option<RecordSchema>) -> Result<Transcoder> {
    if cli.xsd.is_empty() {
        bail!("--xsd is required");
    }
    // The root tag comes from --root, or from the record schema's linkage.
    let root = match (&cli.root, &record_schema) {
        (Some(r), _) => QName::parse(r),
        (None, Some(schema)) => schema
            .xml_schemas
            .as_ref()
            .map(|p| p.root_tag.qname())
            .context("record schema carries no xmlSchemas linkage; pass --root")?,
        (None, None) => bail!("either --root or --schema is required"),
    };
    let config = TranscoderConfig {
        base_uri: cli.xsd[0].parent().map(|p| p.to_path_buf()),
        sources: Vec::new(),
        schema_urls: Vec::new(),
        schema_files: cli.xsd.clone(),
        root_tag: RootTag {
            namespace: root.namespace.clone(),
            local_part: root.local.clone(),
        },
    };
    match record_schema {
        Some(schema) => config
            .build_with_record_schema(xmlrec::xsd::FsSchemaSource, schema)
            .context("Compile state machine"),
        None => config.build().context("Compile state machine"),
    }
}

fn transcode_file(mode: &Mode, input: &Utf8PathBuf, out_dir: Option<&Utf8PathBuf>) -> Result<Utf8PathBuf> {
    match mode {
        Mode::Encode(transcoder) => {
            let output = output_path(input, "bin", out_dir);
            let text = std::fs::read_to_string(input).with_context(|| format!("Read {}", input))?;
            let bytes = transcoder
                .encode(&text)
                .with_context(|| format!("Encode {}", input))?;
            std::fs::write(&output, bytes).with_context(|| format!("Write {}", output))?;
            Ok(output)
        }
        Mode::Decode(schema) => {
            let output = output_path(input, "xml", out_dir);
            let bytes = std::fs::read(input).with_context(|| format!("Read {}", input))?;
            let mut sink = XmlTextSink::new();
            xmlrec::transducer::read_binary(schema, bytes.as_slice(), &mut sink)
                .with_context(|| format!("Decode {}", input))?;
            std::fs::write(&output, sink.into_string())
                .with_context(|| format!("Write {}", output))?;
            Ok(output)
        }
    }
}

fn output_path(input: &Utf8PathBuf, ext: &str, out_dir: Option<&Utf8PathBuf>) -> Utf8PathBuf {
    let mut out = match out_dir {
        Some(dir) => dir.join(input.file_name().unwrap_or("out")),
        None => input.clone(),
    };
    out.set_extension(ext);
    out
}
