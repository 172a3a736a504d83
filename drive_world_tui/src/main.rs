use drive_world_core::{
    DriveId, Position,
    agent::{PathAgent, RandomDrive},
    warehouse::{MoveOutcome, Warehouse, load_warehouse_from_string},
};
use anyhow::Result;
use clap::Parser;
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    io::{self, Stdout},
    path::PathBuf,
    time::{Duration, Instant},
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Map file to load
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Milliseconds between simulation ticks
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Seed for the random traffic drives
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Where the current episode stands.
enum Episode {
    Running,
    Complete { ticks: u64 },
    Faulted(String),
}

struct App {
    /// The core warehouse simulation.
    warehouse: Warehouse,
    /// Simulation ticks processed so far.
    ticks: u64,
    /// Flag to control the main loop.
    should_quit: bool,
    /// Flag to control if the episode is over.
    episode: Episode,
}

impl App {
    fn new(map_file: PathBuf, seed: u64) -> Result<Self> {
        // Get map from file
        let file_string = std::fs::read_to_string(&map_file)?;
        let (mut warehouse, start_position, traffic_positions) =
            load_warehouse_from_string(&file_string).map_err(|e| anyhow::anyhow!(e))?;

        // The player drive runs the greedy path agent; in advanced mode it
        // fetches the target pod before heading for the goal.
        let advanced = warehouse.advanced_mode();
        let agent = PathAgent::new(warehouse.reserve_drive_id(), advanced);
        let player = warehouse
            .add_drive(start_position, Box::new(agent))
            .map_err(|e| anyhow::anyhow!(e))?;
        warehouse
            .set_player_drive(player)
            .map_err(|e| anyhow::anyhow!(e))?;

        // Every traffic cell gets a random walker with its own seed
        for (offset, position) in traffic_positions.into_iter().enumerate() {
            let walker = RandomDrive::new(
                warehouse.reserve_drive_id(),
                seed.wrapping_add(offset as u64),
            );
            warehouse
                .add_drive(position, Box::new(walker))
                .map_err(|e| anyhow::anyhow!(e))?;
        }

        Ok(App {
            warehouse,
            ticks: 0,
            should_quit: false,
            episode: Episode::Running,
        })
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) {
        if !matches!(self.episode, Episode::Running) {
            return;
        }
        match self.warehouse.process_turn() {
            Ok(MoveOutcome::Completed) => {
                self.ticks += 1;
                self.episode = Episode::Complete { ticks: self.ticks };
            }
            Ok(_) => {
                self.ticks += 1;
            }
            Err(e) => {
                self.episode = Episode::Faulted(e.to_string());
            }
        }
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    // If no map file is provided, use the default map
    let map_file = args.map.unwrap_or(PathBuf::from("maps/map01.txt"));
    // Ensure the map file exists
    if !map_file.exists() {
        return Err(anyhow::anyhow!(
            "Map file does not exist: {}",
            map_file.display()
        ));
    }

    // Create the application state before touching the terminal so load
    // errors print normally
    let mut app = App::new(map_file, args.seed)?;

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run the main application loop
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));

    // Restore the terminal state
    restore_terminal(&mut terminal)?;

    result
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?; // Put terminal in raw mode
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?; // Use alternate screen and enable mouse capture
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into) // Map io::Error to anyhow::Error
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        // Draw the UI
        terminal.draw(|f| ui(f, app))?;

        // Calculate timeout for event polling
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        // Poll for events (keyboard, mouse, etc.)
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    _ => {}
                }
            }
        }

        // Update application state if enough time has passed
        if last_tick.elapsed() >= tick_rate {
            app.tick(); // Perform simulation step
            last_tick = Instant::now();
        }

        // Exit loop if requested
        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(70), // Area for the map
            Constraint::Percentage(20), // Area for the drive roster
            Constraint::Percentage(10), // Area for status/help
        ])
        .split(frame.area());

    // Render the map
    render_map(frame, main_layout[0], &app.warehouse);

    // Render the drive roster
    render_drives(frame, main_layout[1], &app.warehouse);

    // Render status/help text
    let status = match &app.episode {
        Episode::Running => format!("Tick {} | Press 'q' or 'Esc' to quit.", app.ticks),
        Episode::Complete { ticks } => {
            format!("Episode complete after {} ticks. Press 'q' to quit.", ticks)
        }
        Episode::Faulted(reason) => format!("Drive faulted: {} Press 'q' to quit.", reason),
    };
    let help_text = Paragraph::new(status)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Renders one line per drive: id, role, position and any carried pod.
fn render_drives(frame: &mut Frame, area: Rect, warehouse: &Warehouse) {
    let player = warehouse.player_drive();
    let mut states: Vec<_> = warehouse.drives().collect();
    states.sort_by_key(|drive| drive.id);

    let roster_items: Vec<ListItem> = states
        .iter()
        .map(|drive| {
            let role = if Some(drive.id) == player {
                "path agent"
            } else {
                "traffic"
            };
            let carrying = match drive.lifted_pod {
                Some(pod_id) => format!(" Carrying pod: {}", pod_id),
                None => String::new(),
            };
            ListItem::new(format!(
                "Drive: {} ({}) Pos: ({}, {}){}",
                drive.id, role, drive.position.x, drive.position.y, carrying
            ))
        })
        .collect();

    let roster_widget =
        List::new(roster_items).block(Block::default().borders(Borders::ALL).title("Drives"));
    frame.render_widget(roster_widget, area);
}

/// Renders the warehouse floor onto the frame.
fn render_map(frame: &mut Frame, area: Rect, warehouse: &Warehouse) {
    let field = warehouse.field();
    let goal = warehouse.goal();
    let player = warehouse.player_drive();

    // Create a representation of the floor including the boundary ring
    let mut lines: Vec<Line> = Vec::with_capacity(field.height() as usize + 2);

    // Positive y points up, so draw from the top row down
    for y in (-1..=field.height()).rev() {
        let mut spans: Vec<Span> = Vec::with_capacity(field.width() as usize + 2);
        for x in -1..=field.width() {
            spans.push(cell_span(warehouse, player, goal, Position { x, y }));
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Drive World").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

/// Picks the glyph for one cell. Drives cover pods, pods cover the goal,
/// and the goal covers the floor.
fn cell_span(
    warehouse: &Warehouse,
    player: Option<DriveId>,
    goal: Option<Position>,
    cell: Position,
) -> Span<'static> {
    if let Some(drive) = warehouse.drives().find(|d| d.position == cell) {
        return if Some(drive.id) == player {
            // Display the player drive '@' with color
            Span::styled("@", Style::default().fg(Color::Red).bold())
        } else {
            Span::styled("d", Style::default().fg(Color::Blue))
        };
    }
    // Lifted pods ride on their drive and are covered by its glyph
    if let Some(pod) = warehouse
        .pods()
        .find(|p| p.position == cell && p.lifted_by.is_none())
    {
        return if warehouse.target_pod() == Some(pod.id) {
            Span::styled("O", Style::default().fg(Color::Yellow).bold())
        } else {
            Span::styled("o", Style::default().fg(Color::Yellow))
        };
    }
    if goal == Some(cell) {
        return Span::styled("G", Style::default().fg(Color::Green).bold());
    }
    if warehouse.field().boundaries().contains(&cell) {
        return Span::styled("#", Style::default().fg(Color::DarkGray));
    }
    Span::raw(" ")
}
