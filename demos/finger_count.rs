//! Counts extended fingers in an image and writes an annotated copy.
//!
//! Usage: `finger_count <input.{jpg,png}> [output.{jpg,png}]`

use anyhow::Context;
use handmark::{
    image::{draw, Color, Image},
    landmark::LandmarkIdx,
    HandDetector, HandDetectorOptions,
};

/// If `true`, the regions of interest the landmark network looked at are drawn as well.
const DRAW_REGIONS: bool = true;

fn main() -> anyhow::Result<()> {
    handmark::init_logger!();

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .context("usage: finger_count <input image> [output image]")?;
    let output = args.next().unwrap_or_else(|| "annotated.png".to_string());

    let image = Image::load(&input)?;
    let options = HandDetectorOptions::default().static_mode(true);
    let mut detector = HandDetector::new(options)?;

    let mut annotated = detector.find_hands(&image, true)?;
    println!("{} hand(s) in {}", detector.results().len(), input);

    for (index, hand) in detector.results().hands().to_vec().iter().enumerate() {
        let (landmarks, bbox) = detector.find_position(&mut annotated, index, true)?;
        let bbox = match bbox {
            Some(bbox) => bbox,
            None => continue,
        };
        println!(
            "hand #{} ({:?}, presence {:.2}): bounding box {:?}",
            index,
            hand.handedness(),
            hand.presence(),
            bbox.to_array(),
        );
        for lm in &landmarks {
            println!("  {:>2}: ({}, {})", lm.id, lm.x, lm.y);
        }

        if let Some(fingers) = detector.fingers_up() {
            println!("  fingers up: {:?} ({} total)", fingers.flags(), fingers.count());
        }

        let pinch = detector.find_distance(
            LandmarkIdx::ThumbTip as usize,
            LandmarkIdx::IndexFingerTip as usize,
            &annotated,
            true,
        )?;
        println!("  thumb-index distance: {:.1}px", pinch.length);
        annotated = pinch.image;
    }

    if DRAW_REGIONS {
        for roi in detector.engine().regions() {
            draw::polygon(&mut annotated, roi.corners()).color(Color::YELLOW);
        }
    }

    annotated.save(&output)?;
    println!("annotated image written to {}", output);

    Ok(())
}
