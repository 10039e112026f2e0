mod packets;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rtpvc2::bitstream::{SequenceHeader, TransformParameters};
use rtpvc2::parse_info::PARSE_INFO_SIZE;
use rtpvc2::rtp::CLOCK_RATE;
use rtpvc2::rtp::pay::DEFAULT_MTU;
use rtpvc2::{
    FragmentSink, ParseCode, ParseUnits, Payloader, PayloaderConfig, Result, RtpDepacketizer,
    RtpPacketizer,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "vc2-rtp", about = "VC2 HQ RTP payloader and depayloader")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Payload a native VC2 stream into a packet file
    Pay {
        #[arg(long, short)]
        input: PathBuf,
        #[arg(long, short)]
        output: PathBuf,
        /// Fragment MTU, counted after the 4-byte payload header
        #[arg(long, default_value_t = DEFAULT_MTU)]
        mtu: usize,
        /// RTP payload type
        #[arg(long, default_value_t = 96)]
        pt: u8,
        /// RTP SSRC (random when omitted)
        #[arg(long)]
        ssrc: Option<u32>,
        /// Picture rate used to advance the RTP timestamp
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Bytes handed to the payloader per call
        #[arg(long, default_value_t = 4096)]
        chunk: usize,
    },
    /// Rebuild a native VC2 stream from a packet file
    Depay {
        #[arg(long, short)]
        input: PathBuf,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// List the parse units of a native VC2 stream
    Inspect {
        #[arg(long, short)]
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let result = match args.command {
        Command::Pay {
            input,
            output,
            mtu,
            pt,
            ssrc,
            fps,
            chunk,
        } => pay(&input, &output, mtu, pt, ssrc, fps, chunk),
        Command::Depay { input, output } => depay(&input, &output),
        Command::Inspect { input } => inspect(&input),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("vc2-rtp: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn pay(
    input: &Path,
    output: &Path,
    mtu: usize,
    pt: u8,
    ssrc: Option<u32>,
    fps: u32,
    chunk: usize,
) -> Result<()> {
    let stream = std::fs::read(input)?;
    let mut payloader = Payloader::with_config(PayloaderConfig {
        mtu,
        ..Default::default()
    })?;

    let mut sink = match ssrc {
        Some(ssrc) => RtpPacketizer::new(pt, ssrc),
        None => RtpPacketizer::with_random_ssrc(pt),
    };
    sink.set_mtu(mtu);
    sink.set_timestamp_increment(CLOCK_RATE / fps.max(1));
    for line in sink.sdp_attributes() {
        tracing::info!("{}", line);
    }

    let mut out = BufWriter::new(File::create(output)?);
    let mut count = 0usize;
    for part in stream.chunks(chunk.max(1)) {
        payloader.push_to(part, None, None, &mut sink)?;
        count += write_packets(&mut out, &mut sink)?;
    }
    for fragment in payloader.finish() {
        sink.push(fragment)?;
    }
    count += write_packets(&mut out, &mut sink)?;
    out.flush()?;

    tracing::info!(
        bytes = stream.len(),
        packets = count,
        ssrc = format_args!("{:#010X}", sink.ssrc()),
        "payloaded"
    );
    Ok(())
}

fn write_packets<W: Write>(out: &mut W, sink: &mut RtpPacketizer) -> Result<usize> {
    let packets = sink.take_packets();
    for packet in &packets {
        packets::write_packet(out, packet)?;
    }
    Ok(packets.len())
}

fn depay(input: &Path, output: &Path) -> Result<()> {
    let mut reader = BufReader::new(File::open(input)?);
    let mut out = BufWriter::new(File::create(output)?);
    let mut depack = RtpDepacketizer::new();

    let (mut received, mut units) = (0usize, 0usize);
    while let Some(packet) = packets::read_packet(&mut reader)? {
        received += 1;
        match depack.process_packet(&packet) {
            Ok(Some(unit)) => {
                out.write_all(&unit)?;
                units += 1;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(packet = received, error = %e, "skipping packet"),
        }
    }
    out.flush()?;

    tracing::info!(packets = received, units, lost = depack.lost(), "depayloaded");
    Ok(())
}

fn inspect(input: &Path) -> Result<()> {
    let stream = std::fs::read(input)?;

    for (offset, info) in ParseUnits::new(&stream) {
        println!(
            "{:>10}  {:<16} next={:<8} prev={}",
            offset, info.parse_code, info.next_parse_offset, info.prev_parse_offset
        );

        let body_start = offset + PARSE_INFO_SIZE;
        let body_end = match info.parse_code {
            ParseCode::EndOfSequence => body_start,
            _ => offset + info.next_parse_offset as usize,
        };
        let body = &stream[body_start..body_end];

        match info.parse_code {
            ParseCode::SequenceHeader => match SequenceHeader::parse(body) {
                Ok(h) => println!(
                    "            {}x{} {}",
                    h.picture_width,
                    h.picture_height,
                    if h.interlaced { "interlaced" } else { "progressive" }
                ),
                Err(e) => println!("            {}", e),
            },
            ParseCode::HqPicture if body.len() >= 4 => {
                let number = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                match TransformParameters::parse(&body[4..]) {
                    Ok(p) => println!(
                        "            picture {} wavelet={} depth={} slices={}x{} prefix={} scalar={}",
                        number,
                        p.wavelet_index,
                        p.dwt_depth,
                        p.slices_x,
                        p.slices_y,
                        p.slice_prefix_bytes,
                        p.slice_size_scalar
                    ),
                    Err(e) => println!("            picture {}: {}", number, e),
                }
            }
            _ => {}
        }
    }
    Ok(())
}
