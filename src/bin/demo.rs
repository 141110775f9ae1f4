//! Terminal stand-in for the painting demo: paints a disc, samples it on a
//! grid, trains the network in chunks, and renders its output as ASCII
//! shading next to the target pattern.

use paintnnet::grid::SampleGrid;
use paintnnet::session::Session;

const WIDTH: usize = 64;
const HEIGHT: usize = 64;
const GRANULARITY: usize = 4;

const RENDER_WIDTH: usize = 48;
const RENDER_HEIGHT: usize = 24;

/// The "painted" image: a disc in the middle of the canvas.
fn painted(x: usize, y: usize) -> bool {
    let dx = x as f64 - WIDTH as f64 / 2.0;
    let dy = y as f64 - HEIGHT as f64 / 2.0;
    dx * dx + dy * dy <= (WIDTH as f64 / 3.2).powi(2)
}

fn shade(value: f64) -> char {
    const SHADES: [char; 6] = [' ', '.', ':', 'o', 'O', '#'];
    let clamped = value.max(0.0).min(1.0);
    SHADES[(clamped * (SHADES.len() - 1) as f64).round() as usize]
}

fn main() {
    env_logger::init();

    let grid = SampleGrid::new(WIDTH, HEIGHT, GRANULARITY).expect("valid grid dimensions");
    let samples = grid.collect(painted);
    println!(
        "training on {} samples from a {}x{} canvas",
        samples.len(),
        WIDTH,
        HEIGHT
    );

    let mut session = Session::new(vec![6, 4]);
    session.begin(&samples).expect("valid topology and samples");

    for _ in 0..10 {
        let status = session.step(200).expect("session is ready");
        println!(
            "iteration {:5}  error {:6.2}%",
            status.iteration,
            status.error_percent()
        );
    }

    let field = session.render(RENDER_WIDTH, RENDER_HEIGHT).expect("session is ready");
    println!("\nnetwork output ('#' = painted class):");
    for y in 0..RENDER_HEIGHT {
        let row: String = (0..RENDER_WIDTH)
            .map(|x| shade(field[y * RENDER_WIDTH + x]))
            .collect();
        println!("{}", row);
    }
}
