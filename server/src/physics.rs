//! Fixed-step ball simulation
//!
//! Positions are in table units with the origin at the top-left corner and
//! `y` growing downwards. One call to [`tick`] advances the ball by exactly one
//! velocity step; there is no delta time.

use rand::Rng;
use shared::{
    Side, Sides, BALL_SIZE, BASE_SPEED, PADDLE_HEIGHT, PADDLE_WIDTH, SPEED_MULTIPLIER,
    TABLE_HEIGHT, TABLE_WIDTH,
};

/// Axis-aligned rectangle given by its edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Rect {
    /// Strict overlap; rectangles that only touch do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right
            && self.right > other.left
            && self.top < other.bottom
            && self.bottom > other.top
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
    pub size: f32,
}

impl Ball {
    /// A ball resting at the centre of the table with the given velocity.
    pub fn centered(dx: f32, dy: f32) -> Self {
        Self {
            x: TABLE_WIDTH / 2.0,
            y: TABLE_HEIGHT / 2.0,
            dx,
            dy,
            size: BALL_SIZE,
        }
    }

    /// Centre serve at base speed towards a random quadrant.
    pub fn serve(rng: &mut impl Rng) -> Self {
        let dx = if rng.gen_bool(0.5) { BASE_SPEED } else { -BASE_SPEED };
        let dy = if rng.gen_bool(0.5) { BASE_SPEED } else { -BASE_SPEED };
        Self::centered(dx, dy)
    }

    pub fn rect(&self) -> Rect {
        Rect {
            left: self.x,
            right: self.x + self.size,
            top: self.y,
            bottom: self.y + self.size,
        }
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.size / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paddle {
    /// Top edge.
    pub y: f32,
}

impl Paddle {
    pub fn centered() -> Self {
        Self {
            y: TABLE_HEIGHT / 2.0 - PADDLE_HEIGHT / 2.0,
        }
    }

    pub fn rect(&self, side: Side) -> Rect {
        let left = match side {
            Side::Left => 0.0,
            Side::Right => TABLE_WIDTH - PADDLE_WIDTH,
        };
        Rect {
            left,
            right: left + PADDLE_WIDTH,
            top: self.y,
            bottom: self.y + PADDLE_HEIGHT,
        }
    }

    pub fn center_y(&self) -> f32 {
        self.y + PADDLE_HEIGHT / 2.0
    }
}

impl Default for Paddle {
    fn default() -> Self {
        Self::centered()
    }
}

/// Something noteworthy that happened during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEvent {
    /// The ball left the table; the given side earns the point.
    Scored(Side),
    /// The ball was deflected by the paddle on the given side.
    Deflected(Side),
}

/// Advances the ball one step.
///
/// Scoring wins over paddle contact in the same step. Both paddles are
/// tested every step; when the ball overlaps both, both deflections apply in
/// order and the right one is reported.
pub fn tick(ball: &mut Ball, paddles: &Sides<Paddle>) -> Option<TickEvent> {
    ball.x += ball.dx;
    ball.y += ball.dy;

    // No position correction; the ball may overshoot a wall by one step.
    if ball.y <= 0.0 || ball.y + ball.size >= TABLE_HEIGHT {
        ball.dy = -ball.dy;
    }

    if let Some(scorer) = scorer(ball) {
        return Some(TickEvent::Scored(scorer));
    }

    let mut event = None;
    for side in Side::BOTH {
        if deflect(ball, &paddles[side], side) {
            event = Some(TickEvent::Deflected(side));
        }
    }
    event
}

fn scorer(ball: &Ball) -> Option<Side> {
    if ball.x > TABLE_WIDTH {
        Some(Side::Left)
    } else if ball.x + ball.size < 0.0 {
        Some(Side::Right)
    } else {
        None
    }
}

fn deflect(ball: &mut Ball, paddle: &Paddle, side: Side) -> bool {
    let paddle_rect = paddle.rect(side);
    if !ball.rect().intersects(&paddle_rect) {
        return false;
    }

    // Contact point relative to the paddle centre maps linearly onto dy.
    let impact = ball.center_y() - paddle.center_y();
    ball.dy = impact / (PADDLE_HEIGHT / 2.0) * BASE_SPEED;

    let speed = ball.dx.abs() * SPEED_MULTIPLIER;
    match side {
        Side::Left => {
            ball.dx = speed;
            ball.x = paddle_rect.right;
        }
        Side::Right => {
            ball.dx = -speed;
            ball.x = paddle_rect.left - ball.size;
        }
    }
    true
}
