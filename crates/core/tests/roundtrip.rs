//! Native stream -> fragments -> native stream.

mod common;

use common::{Picture, StreamBuilder, assert_chain_consistent, sequence_header_body};
use rtpvc2::bitstream::TransformParameters;
use rtpvc2::rtp::{FieldFlags, HQ_SLICE_HEADER_SIZE};
use rtpvc2::{Depayloader, Fragment, ParseCode, ParseUnits, Payloader, PayloaderConfig};

fn payloader(mtu: usize) -> Payloader {
    Payloader::with_config(PayloaderConfig {
        mtu,
        ..Default::default()
    })
    .unwrap()
}

fn depayload(fragments: &[Fragment]) -> Vec<u8> {
    let mut d = Depayloader::new();
    let mut out = Vec::new();
    for f in fragments {
        if let Some(unit) = d.process(f.payload(), f.marker, false) {
            out.extend_from_slice(&unit);
        }
    }
    out
}

fn simple_stream(picture: &Picture) -> Vec<u8> {
    StreamBuilder::new()
        .sequence_header(9, 0)
        .picture(picture)
        .end_of_sequence()
        .build()
}

#[test]
fn round_trip_reproduces_stream() {
    let stream = StreamBuilder::new()
        .sequence_header(9, 0)
        .picture(&Picture::new(0, 4, 3, 40))
        .picture(&Picture::new(1, 4, 3, 40))
        .end_of_sequence()
        .build();

    let mut p = payloader(200);
    let fragments = p.handle_buffer(&stream, Some(0), None);
    assert_eq!(p.pending(), 0);

    let out = depayload(&fragments);
    assert_chain_consistent(&out);
    assert_eq!(out, stream);
}

#[test]
fn example_stream_fragments() {
    let picture = Picture::new(0, 2, 1, 40);
    let params = TransformParameters::parse(&picture.transform_parameters()).unwrap();
    assert_eq!(params.coded_size, 6);

    let mut p = payloader(1500);
    let fragments = p.handle_buffer(&simple_stream(&picture), None, None);

    let codes: Vec<_> = fragments.iter().map(Fragment::parse_code).collect();
    assert_eq!(
        codes,
        vec![
            ParseCode::SequenceHeader,
            ParseCode::HqFragment,
            ParseCode::HqFragment,
            ParseCode::EndOfSequence
        ]
    );

    let params_hdr = fragments[1].hq_header().unwrap();
    assert_eq!(params_hdr.slice_count, 0);
    assert_eq!(params_hdr.fragment_length, 6);
    assert!(!fragments[1].marker);

    let slices_hdr = fragments[2].hq_header().unwrap();
    assert_eq!(slices_hdr.slice_count, 2);
    assert_eq!(slices_hdr.slice_offset, Some((0, 0)));
    assert_eq!(slices_hdr.fragment_length, 80);
    assert!(fragments[2].marker);

    assert!(!fragments[0].marker && !fragments[3].marker);
    let seqs: Vec<_> = fragments.iter().map(Fragment::ext_seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);
}

#[test]
fn repeated_sequence_header_is_resent_identically() {
    let stream = StreamBuilder::new()
        .sequence_header(9, 0)
        .sequence_header(9, 0)
        .end_of_sequence()
        .build();

    let mut p = payloader(1400);
    let fragments = p.handle_buffer(&stream, None, None);
    assert_eq!(fragments.len(), 3);
    assert_eq!(fragments[0].body(), fragments[1].body());
    assert_eq!(fragments[0].payload()[2..], fragments[1].payload()[2..]);
    assert_eq!(fragments[0].payload()[..2], [0, 0]);
    assert_eq!(fragments[1].payload()[..2], [0, 1]);

    let header = p.sequence_header().unwrap();
    assert_eq!(header.raw(), fragments[0].body());
    assert_eq!((header.picture_width, header.picture_height), (1280, 720));
}

#[test]
fn changed_sequence_header_replaces_the_cache() {
    let progressive = sequence_header_body(9, 0);
    let interlaced = sequence_header_body(11, 1);
    assert_ne!(progressive, interlaced);

    let stream = StreamBuilder::new()
        .sequence_header(9, 0)
        .picture(&Picture::new(0, 2, 1, 40))
        .sequence_header(11, 1)
        .picture(&Picture::new(2, 2, 1, 40))
        .picture(&Picture::new(3, 2, 1, 40))
        .end_of_sequence()
        .build();

    let mut p = payloader(1400);
    let fragments = p.handle_buffer(&stream, None, None);

    let headers: Vec<_> = fragments
        .iter()
        .filter(|f| f.parse_code() == ParseCode::SequenceHeader)
        .map(Fragment::body)
        .collect();
    assert_eq!(headers, vec![&progressive[..], &interlaced[..]]);

    let header = p.sequence_header().unwrap();
    assert_eq!(header.raw(), &interlaced[..]);
    assert!(header.interlaced);
    assert_eq!((header.picture_width, header.picture_height), (1920, 540));

    let flags: Vec<_> = fragments
        .iter()
        .filter_map(|f| Some((f.hq_header()?.picture_number, f.field_flags())))
        .collect();
    assert_eq!(
        flags,
        vec![
            (0, FieldFlags::Progressive),
            (0, FieldFlags::Progressive),
            (2, FieldFlags::FirstField),
            (2, FieldFlags::FirstField),
            (3, FieldFlags::SecondField),
            (3, FieldFlags::SecondField),
        ]
    );
    assert_eq!(depayload(&fragments), stream);
}

#[test]
fn fragments_carry_their_own_unit_timestamps() {
    let stream = StreamBuilder::new()
        .sequence_header(9, 0)
        .picture(&Picture::new(0, 2, 1, 40))
        .picture(&Picture::new(1, 2, 1, 40))
        .end_of_sequence()
        .build();
    let bounds: Vec<usize> = ParseUnits::new(&stream)
        .map(|(offset, _)| offset)
        .chain([stream.len()])
        .collect();
    assert_eq!(bounds.len(), 5);

    // One unit per buffer, 40 ms apart. Each unit is only delimited once
    // the next buffer arrives.
    let ms = |n: u64| Some(n * 1_000_000);
    let mut p = payloader(1400);
    let mut stamped = Vec::new();
    for (i, unit) in bounds.windows(2).enumerate() {
        let pts = ms(40 * i as u64);
        for f in p.handle_buffer(&stream[unit[0]..unit[1]], pts, pts) {
            let picture = f.hq_header().map(|h| h.picture_number);
            stamped.push((f.parse_code(), picture, f.pts, f.dts));
        }
    }

    assert_eq!(
        stamped,
        vec![
            (ParseCode::SequenceHeader, None, ms(0), ms(0)),
            (ParseCode::HqFragment, Some(0), ms(40), ms(40)),
            (ParseCode::HqFragment, Some(0), ms(40), ms(40)),
            (ParseCode::HqFragment, Some(1), ms(80), ms(80)),
            (ParseCode::HqFragment, Some(1), ms(80), ms(80)),
            (ParseCode::EndOfSequence, None, ms(120), ms(120)),
        ]
    );
}

#[test]
fn unit_split_across_buffers_keeps_first_timestamp() {
    let stream = simple_stream(&Picture::new(0, 2, 1, 40));
    let seq_len = ParseUnits::new(&stream).next().unwrap().1.next_parse_offset as usize;
    // The picture is split mid-slice over two buffers.
    let split = seq_len + 40;

    let mut p = payloader(1400);
    let mut fragments = p.handle_buffer(&stream[..split], Some(1), None);
    fragments.extend(p.handle_buffer(&stream[split..], Some(2), None));

    let pts: Vec<_> = fragments.iter().map(|f| (f.parse_code(), f.pts)).collect();
    assert_eq!(
        pts,
        vec![
            (ParseCode::SequenceHeader, Some(1)),
            (ParseCode::HqFragment, Some(1)),
            (ParseCode::HqFragment, Some(1)),
            (ParseCode::EndOfSequence, Some(2)),
        ]
    );
}

#[test]
fn slices_are_packed_to_the_mtu() {
    let picture = Picture::new(3, 10, 2, 40);
    let mtu = 150;
    // Three 40-byte slices plus the 16-byte header fit in 150.
    let per_fragment = (mtu - HQ_SLICE_HEADER_SIZE) / picture.slice_len();
    assert_eq!(per_fragment, 3);

    let mut p = payloader(mtu);
    let fragments = p.handle_buffer(&simple_stream(&picture), None, None);

    let slice_fragments: Vec<_> = fragments
        .iter()
        .filter(|f| f.hq_header().is_some_and(|h| h.slice_count > 0))
        .collect();
    assert_eq!(
        slice_fragments.len(),
        picture.slice_count().div_ceil(per_fragment)
    );

    for f in &fragments {
        assert!(f.body().len() <= mtu || f.parse_code() != ParseCode::HqFragment);
    }

    let mut next = 0usize;
    for (i, f) in slice_fragments.iter().enumerate() {
        let h = f.hq_header().unwrap();
        let (x, y) = h.slice_offset.unwrap();
        assert_eq!((x as usize, y as usize), (next % 10, next / 10));
        next += h.slice_count as usize;
        assert_eq!(f.marker, i + 1 == slice_fragments.len());
    }
    assert_eq!(next, picture.slice_count());

    let hq_markers = fragments
        .iter()
        .filter(|f| f.parse_code() == ParseCode::HqFragment && f.marker)
        .count();
    assert_eq!(hq_markers, 1);
}

#[test]
fn zeroed_next_offset_is_rescanned() {
    let stream = StreamBuilder::new()
        .sequence_header(9, 0)
        .picture(&Picture::new(0, 2, 2, 13))
        .padding(5)
        .picture(&Picture::new(1, 2, 2, 13))
        .end_of_sequence()
        .build();

    let seq_len = ParseUnits::new(&stream).next().unwrap().1.next_parse_offset as usize;
    let mut corrupted = stream.clone();
    corrupted[seq_len + 5..seq_len + 9].copy_from_slice(&[0; 4]);

    let clean: Vec<_> = ParseUnits::new(&stream).collect();
    let rescanned: Vec<_> = ParseUnits::new(&corrupted).collect();
    assert_eq!(clean.len(), 5);
    assert_eq!(clean, rescanned);

    let mut a = payloader(100);
    let mut b = payloader(100);
    assert_eq!(
        a.handle_buffer(&stream, None, None),
        b.handle_buffer(&corrupted, None, None)
    );
}

#[test]
fn chunked_input_matches_whole_input() {
    let stream = simple_stream(&Picture::new(7, 5, 4, 19));

    let whole = payloader(120).handle_buffer(&stream, None, None);

    let mut p = payloader(120);
    let mut chunked = Vec::new();
    for chunk in stream.chunks(7) {
        chunked.extend(p.handle_buffer(chunk, None, None));
    }
    chunked.extend(p.finish());

    assert_eq!(whole, chunked);
    assert_eq!(depayload(&chunked), stream);
}

#[test]
fn leading_garbage_is_skipped() {
    let stream = simple_stream(&Picture::new(0, 2, 1, 40));
    let mut input = vec![0xFF; 50];
    input.extend_from_slice(b"BBCD");
    input.extend_from_slice(&[0x11; 20]);
    input.extend_from_slice(&stream);

    let fragments = payloader(1400).handle_buffer(&input, None, None);
    assert_eq!(depayload(&fragments), stream);
}

#[test]
fn interlaced_pictures_carry_field_flags() {
    let stream = StreamBuilder::new()
        .sequence_header(9, 1)
        .picture(&Picture::new(4, 2, 1, 40))
        .picture(&Picture::new(5, 2, 1, 40))
        .end_of_sequence()
        .build();

    let mut p = payloader(1400);
    let fragments = p.handle_buffer(&stream, None, None);
    assert!(p.sequence_header().unwrap().interlaced);
    assert_eq!(p.sequence_header().unwrap().picture_height, 360);

    let flags: Vec<_> = fragments
        .iter()
        .map(|f| (f.parse_code(), f.field_flags()))
        .collect();
    assert_eq!(
        flags,
        vec![
            (ParseCode::SequenceHeader, FieldFlags::Progressive),
            (ParseCode::HqFragment, FieldFlags::FirstField),
            (ParseCode::HqFragment, FieldFlags::FirstField),
            (ParseCode::HqFragment, FieldFlags::SecondField),
            (ParseCode::HqFragment, FieldFlags::SecondField),
            (ParseCode::EndOfSequence, FieldFlags::Progressive),
        ]
    );
    assert_eq!(depayload(&fragments), stream);
}

#[test]
fn picture_without_sequence_header_is_progressive() {
    let stream = StreamBuilder::new()
        .padding(3)
        .picture(&Picture::new(1, 2, 1, 40))
        .end_of_sequence()
        .build();

    let fragments = payloader(1400).handle_buffer(&stream, None, None);
    assert_eq!(fragments.len(), 3);
    assert!(
        fragments
            .iter()
            .all(|f| f.field_flags() == FieldFlags::Progressive)
    );
}

#[test]
fn malformed_picture_emits_nothing() {
    let picture = Picture::new(0, 2, 1, 40);
    let mut body = picture.body();
    body.truncate(body.len() - 10); // last slice overruns
    let stream = StreamBuilder::new()
        .sequence_header(9, 0)
        .unit(ParseCode::HqPicture, &body)
        .end_of_sequence()
        .build();

    let codes: Vec<_> = payloader(1400)
        .handle_buffer(&stream, None, None)
        .iter()
        .map(Fragment::parse_code)
        .collect();
    assert_eq!(
        codes,
        vec![ParseCode::SequenceHeader, ParseCode::EndOfSequence]
    );
}
